use serde_json::Value;

/// Current value of one form control as the user left it.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Checkbox(bool),
    Text(String),
    Select(String),
    Button,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub control: Control,
    /// Marked when the user edited the control.
    pub changed: bool,
}

impl FormField {
    pub fn checkbox(name: &str, checked: bool) -> Self {
        Self::edited(name, Control::Checkbox(checked))
    }

    pub fn text(name: &str, value: &str) -> Self {
        Self::edited(name, Control::Text(value.to_string()))
    }

    pub fn select(name: &str, value: &str) -> Self {
        Self::edited(name, Control::Select(value.to_string()))
    }

    fn edited(name: &str, control: Control) -> Self {
        Self {
            name: name.to_string(),
            control,
            changed: true,
        }
    }

    pub fn unchanged(mut self) -> Self {
        self.changed = false;
        self
    }
}

/// Numeric select values are stored as integers, everything else as text.
pub fn select_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::from(f.trunc() as i64),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_values_prefer_integers() {
        assert_eq!(select_value("42"), json!(42));
        assert_eq!(select_value("1.9"), json!(1));
        assert_eq!(select_value("XEPG"), json!("XEPG"));
        assert_eq!(select_value("30_Minutes"), json!("30_Minutes"));
    }
}
