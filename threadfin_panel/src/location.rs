use crate::error::ConfigError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use threadfin_protocol::{TOKEN_COOKIE, WS_PATH};
use url::Url;

/// Token value sent when no session cookie exists yet.
const MISSING_TOKEN: &str = "undefined";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageScheme {
    Http,
    Https,
}

impl PageScheme {
    pub fn ws_scheme(self) -> &'static str {
        match self {
            PageScheme::Http => "ws",
            PageScheme::Https => "wss",
        }
    }
}

/// Scheme, host and port of the page the panel is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub scheme: PageScheme,
    pub host: String,
    pub port: Option<u16>,
}

impl PageLocation {
    pub fn parse(page_url: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(page_url).map_err(|source| ConfigError::Url {
            url: page_url.to_string(),
            source,
        })?;
        let scheme = match url.scheme() {
            "http" => PageScheme::Http,
            "https" => PageScheme::Https,
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::MissingHost(page_url.to_string()))?
            .to_string();
        Ok(Self {
            scheme,
            host,
            port: url.port(),
        })
    }

    /// Websocket endpoint for one request, carrying `token` as a query parameter.
    pub fn connection_url(&self, token: Option<&str>) -> Result<Url, url::ParseError> {
        let authority = match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        };
        let mut url = Url::parse(&format!(
            "{}://{authority}{WS_PATH}",
            self.scheme.ws_scheme()
        ))?;
        url.query_pairs_mut()
            .append_pair(TOKEN_COOKIE, token.unwrap_or(MISSING_TOKEN));
        Ok(url)
    }
}

/// Client-side cookie store in `document.cookie` form, optionally backed by a file.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    entries: Vec<(String, String)>,
    path: Option<PathBuf>,
}

impl CookieJar {
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split(';')
            .filter_map(|part| {
                let part = part.trim();
                if part.is_empty() {
                    return None;
                }
                let (name, value) = part.split_once('=').unwrap_or((part, ""));
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();
        Self {
            entries,
            path: None,
        }
    }

    /// Loads the jar from `path`; a missing file yields an empty jar bound to it.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        let mut jar = Self::parse(&raw);
        jar.path = Some(path);
        Ok(jar)
    }

    /// Value of `name`, only when the cookie is present exactly once.
    pub fn get(&self, name: &str) -> Option<&str> {
        let mut matches = self.entries.iter().filter(|(n, _)| n == name);
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first.1.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.entries.retain(|(n, _)| n != name);
        self.entries.push((name.to_string(), value.to_string()));
    }

    pub fn token(&self) -> Option<&str> {
        self.get(TOKEN_COOKIE)
    }

    pub fn to_cookie_string(&self) -> String {
        self.entries
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Writes the jar back to its file, if it has one.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, self.to_cookie_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_page_yields_secure_socket() {
        let page = PageLocation::parse("https://tv.example.org:34400/web/").unwrap();
        let url = page.connection_url(Some("abc")).unwrap();
        assert_eq!(url.as_str(), "wss://tv.example.org:34400/ws/?Token=abc");
    }

    #[test]
    fn plain_page_yields_plain_socket() {
        let page = PageLocation::parse("http://192.168.1.10:34400/web/").unwrap();
        let url = page.connection_url(Some("abc")).unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.port(), Some(34400));
        assert_eq!(url.path(), "/ws/");
    }

    #[test]
    fn default_port_is_left_implicit_and_missing_token_is_undefined() {
        let page = PageLocation::parse("https://tv.example.org/web/").unwrap();
        assert_eq!(page.port, None);
        let url = page.connection_url(None).unwrap();
        assert_eq!(url.as_str(), "wss://tv.example.org/ws/?Token=undefined");
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(matches!(
            PageLocation::parse("ftp://host/"),
            Err(ConfigError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            PageLocation::parse("not a url"),
            Err(ConfigError::Url { .. })
        ));
    }

    #[test]
    fn cookie_lookup_requires_a_single_match() {
        let jar = CookieJar::parse("lang=en; Token=t1");
        assert_eq!(jar.token(), Some("t1"));
        assert_eq!(jar.get("lang"), Some("en"));
        assert_eq!(jar.get("missing"), None);

        let dup = CookieJar::parse("Token=a; Token=b");
        assert_eq!(dup.token(), None);
    }

    #[test]
    fn set_replaces_existing_cookie() {
        let mut jar = CookieJar::parse("Token=a; Token=b; lang=en");
        jar.set("Token", "c");
        assert_eq!(jar.token(), Some("c"));
        assert_eq!(jar.to_cookie_string(), "lang=en; Token=c");
    }

    #[test]
    fn jar_round_trips_through_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cookies");

        let mut jar = CookieJar::load(&path).unwrap();
        assert_eq!(jar.token(), None);
        jar.set("Token", "persisted");
        jar.save().unwrap();

        let reloaded = CookieJar::load(&path).unwrap();
        assert_eq!(reloaded.token(), Some("persisted"));
    }
}
