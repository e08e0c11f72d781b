use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use threadfin_panel::config::{PanelConfig, DEFAULT_PAGE_URL};
use threadfin_panel::form::{Control, FormField};
use threadfin_panel::host::PanelHost;
use threadfin_panel::layout::render_page;
use threadfin_panel::logs::{render_logs, LogPoller};
use threadfin_panel::state::ServerState;
use threadfin_panel::{logs, server_info, settings, version_check, wizard, Command, Controller, Outcome};
use threadfin_protocol::commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "threadfin_panel", about = "Drive a Threadfin server from the terminal")]
struct Args {
    /// Page the panel is served from; the websocket endpoint is derived from it.
    #[arg(long, env = "THREADFIN_URL", default_value = DEFAULT_PAGE_URL)]
    url: String,

    /// Keeps the session token between runs.
    #[arg(long, env = "THREADFIN_COOKIE_FILE", value_name = "PATH")]
    cookie_file: Option<PathBuf>,

    #[arg(long, env = "THREADFIN_TOKEN")]
    token: Option<String>,

    #[arg(long, env = "THREADFIN_RELEASES_URL")]
    releases_url: Option<String>,

    /// Write rendered HTML here instead of stdout.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Fetch the server configuration and render the page.
    Show,
    /// Send a raw command with an optional JSON object payload.
    Send {
        cmd: String,
        #[arg(long)]
        data: Option<String>,
    },
    /// Change settings, e.g. `set tuner=2 ssdp=false`.
    Set {
        #[arg(required = true, value_name = "KEY=VALUE")]
        assignments: Vec<String>,
    },
    /// Print the server log.
    Logs {
        #[arg(long, default_value_t = false)]
        follow: bool,
        #[arg(long, default_value_t = 5000)]
        interval_ms: u64,
        #[arg(long)]
        rounds: Option<usize>,
    },
    ResetLogs,
    /// Run the first-run wizard.
    Wizard {
        #[arg(long, default_value_t = 1)]
        tuner: u32,
        #[arg(long, default_value = "XEPG")]
        epg_source: String,
        #[arg(long, default_value = "")]
        m3u: String,
        #[arg(long, default_value = "")]
        xmltv: String,
    },
    /// Upload the image used for channels without a logo.
    UploadImage { path: PathBuf },
    /// Look for a newer release on GitHub.
    CheckUpdate {
        #[arg(long, default_value_t = false)]
        apply: bool,
    },
    Backup,
    /// Switch between the stable and beta release channels.
    ChangeVersion,
}

/// Terminal host: pages go to stdout (or `--out`), notices to stderr.
struct ConsoleHost {
    out: Option<PathBuf>,
    log_view: bool,
    wizard_step: usize,
}

impl ConsoleHost {
    fn emit(&self, html: String) {
        match &self.out {
            Some(path) => {
                if let Err(e) = std::fs::write(path, html) {
                    tracing::error!(path = %path.display(), "failed to write page: {e}");
                }
            }
            None => println!("{html}"),
        }
    }
}

impl PanelHost for ConsoleHost {
    fn render_layout(&mut self, state: &ServerState) {
        if self.log_view {
            return;
        }
        self.emit(render_page(state, self.wizard_step).to_html());
    }

    fn show_element(&mut self, id: &str, visible: bool) {
        tracing::debug!(%id, visible, "show element");
    }

    fn alert(&mut self, text: &str) {
        eprintln!("alert: {text}");
    }

    fn click_menu(&mut self, menu: &str) {
        eprintln!("menu: {menu}");
    }

    fn navigate(&mut self, url: &str) {
        eprintln!("open: {url}");
    }

    fn reload(&mut self) {
        eprintln!("server requested a reload");
    }

    fn open_wizard(&mut self, step: usize) {
        self.wizard_step = step;
        eprintln!("wizard step {}/{}", step + 1, wizard::STEPS.len());
    }

    fn set_input(&mut self, id: &str, value: &str, _changed: bool) {
        eprintln!("{id} = {value}");
    }

    fn set_checked(&mut self, id: &str, checked: bool, _changed: bool) {
        eprintln!("{id} = {checked}");
    }

    fn log_view_visible(&self) -> bool {
        self.log_view
    }

    fn render_logs(&mut self, state: &ServerState, _scroll_down: bool) {
        for entry in state.log_entries() {
            println!("{entry}");
        }
        tracing::trace!(html = %render_logs(state).to_html(), "log view");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = PanelConfig::new(&args.url)?
        .with_cookie_file(args.cookie_file.clone())
        .with_token(args.token.clone())
        .with_releases_url(args.releases_url.clone());

    let mut ctrl = Controller::new(&config)?;
    let mut host = ConsoleHost {
        out: args.out.clone(),
        log_view: matches!(args.command, Cmd::Logs { .. }),
        wizard_step: 0,
    };
    let timeout = Duration::from_secs(args.timeout_secs);

    match args.command {
        Cmd::Show => {
            let outcome = roundtrip(&mut ctrl, &mut host, &Command::new(commands::GET_SERVER_CONFIG), timeout).await?;
            report(outcome)?;
        }
        Cmd::Send { cmd, data } => {
            let mut command = Command::new(&cmd);
            if let Some(data) = data {
                let payload: Map<String, Value> =
                    serde_json::from_str(&data).context("--data must be a JSON object")?;
                command.payload = payload;
            }
            let outcome = roundtrip(&mut ctrl, &mut host, &command, timeout).await?;
            report(outcome)?;
        }
        Cmd::Set { assignments } => {
            report(roundtrip(&mut ctrl, &mut host, &Command::new(commands::GET_SERVER_CONFIG), timeout).await?)?;
            let mut fields = Vec::new();
            for assignment in &assignments {
                let (key, value) = assignment
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected KEY=VALUE, got {assignment:?}"))?;
                let field = settings::field_from_text(key, value)?;
                settings::record_edit(&mut ctrl.state, &field);
                fields.push(field);
            }
            let edits = ctrl.state.pending_edits.clone();
            let command = settings::save_settings_command(&fields);
            let outcome = roundtrip(&mut ctrl, &mut host, &command, timeout).await?;
            if matches!(outcome, Outcome::ServerError(_)) {
                edits.revert(&mut fields);
                for field in &fields {
                    let value = match &field.control {
                        Control::Checkbox(checked) => checked.to_string(),
                        Control::Text(v) | Control::Select(v) => v.clone(),
                        Control::Button => continue,
                    };
                    eprintln!("kept {} = {value}", field.name);
                }
            }
            report(outcome)?;
        }
        Cmd::Logs {
            follow,
            interval_ms,
            rounds,
        } => {
            let poller = LogPoller {
                interval: Duration::from_millis(interval_ms),
                rounds: if follow { rounds } else { Some(1) },
            };
            poller.run(&mut ctrl, &mut host).await?;
        }
        Cmd::ResetLogs => {
            let id = logs::reset_logs(&mut ctrl)?;
            report(wait(&mut ctrl, &mut host, id, timeout).await?)?;
        }
        Cmd::Wizard {
            tuner,
            epg_source,
            m3u,
            xmltv,
        } => {
            let id = wizard::ready_for_configuration(&mut ctrl, &mut host, 0)?;
            report(wait(&mut ctrl, &mut host, id, timeout).await?)?;

            let answers = [
                FormField::select("tuner", &tuner.to_string()),
                FormField::select("epgSource", &epg_source),
                FormField::text("m3u", &m3u),
                FormField::text("xmltv", &xmltv),
            ];
            for (step, answer) in answers.iter().enumerate().skip(host.wizard_step) {
                tracing::info!(step, field = %answer.name, "wizard step");
                let Some(id) = wizard::save_wizard(&mut ctrl, &mut host, std::slice::from_ref(answer))? else {
                    return Err(anyhow!("wizard stopped at step {}", step + 1));
                };
                report(wait(&mut ctrl, &mut host, id, timeout).await?)?;
                if !ctrl.state.server.configuration_wizard() {
                    break;
                }
            }
        }
        Cmd::UploadImage { path } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;
            let id = settings::upload_custom_image(&mut ctrl, &mut host, filename, &bytes)?;
            report(wait(&mut ctrl, &mut host, id, timeout).await?)?;
        }
        Cmd::CheckUpdate { apply } => {
            report(roundtrip(&mut ctrl, &mut host, &Command::new(commands::GET_SERVER_CONFIG), timeout).await?)?;
            let info = ctrl.state.server.client_info();
            match version_check::check_for_update(&config.releases_url, &info).await {
                Some(notice) => {
                    eprintln!("update available: {} -> {}", notice.current, notice.latest);
                    if apply {
                        version_check::apply_update(&mut ctrl, &mut host).await?;
                    }
                }
                None => eprintln!("no update available"),
            }
        }
        Cmd::ChangeVersion => {
            let outcome = roundtrip(&mut ctrl, &mut host, &server_info::change_version_command(), timeout).await?;
            report(outcome)?;
            let info = ctrl.state.server.client_info();
            eprintln!("release channel: {}", if info.beta { "beta" } else { "stable" });
        }
        Cmd::Backup => {
            let outcome = roundtrip(&mut ctrl, &mut host, &Command::new(commands::BACKUP), timeout).await?;
            report(outcome)?;
        }
    }

    Ok(())
}

async fn roundtrip(
    ctrl: &mut Controller,
    host: &mut ConsoleHost,
    command: &Command,
    timeout: Duration,
) -> anyhow::Result<Outcome> {
    tokio::time::timeout(timeout, ctrl.request(command, host))
        .await
        .map_err(|_| anyhow!("no reply to {} within {}s", command.name, timeout.as_secs()))?
        .map_err(Into::into)
}

async fn wait(
    ctrl: &mut Controller,
    host: &mut ConsoleHost,
    id: u64,
    timeout: Duration,
) -> anyhow::Result<Outcome> {
    tokio::time::timeout(timeout, ctrl.wait_for(id, host))
        .await
        .map_err(|_| anyhow!("no reply within {}s", timeout.as_secs()))?
        .map_err(Into::into)
}

fn report(outcome: Outcome) -> anyhow::Result<()> {
    match outcome {
        Outcome::ServerError(e) => Err(anyhow!("server error: {e}")),
        Outcome::ConnectionFailed { .. } => Err(anyhow!("server unreachable")),
        _ => Ok(()),
    }
}
