//! Command-line arguments of the running program.

#[derive(Clone, Debug, Default)]
pub struct Arguments {
    pub args: Vec<String>,
}

impl Arguments {
    pub fn capture() -> Self {
        let args = std::env::args().collect();
        Self { args }
    }

    pub fn from_vec(args: Vec<String>) -> Self {
        Self { args }
    }

    /// Name the program was started as.
    pub fn script(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    /// Whether `<prefix><arg>` was passed, e.g. `exists("y", "-")` for `-y`.
    pub fn exists(&self, arg: &str, prefix: &str) -> bool {
        let wanted = format!("{}{}", prefix, arg);
        self.args.iter().any(|a| *a == wanted)
    }
}
