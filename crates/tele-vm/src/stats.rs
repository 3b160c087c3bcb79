use std::fmt::{Display, Formatter};

/// Collects short statistics while a mirror refreshes, for a single trace line
#[derive(Debug, Default, Clone)]
pub struct StatsPrinter {
    stats: Vec<String>,
}

impl StatsPrinter {
    /// Creates an empty printer
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one statistic
    pub fn add_stat(&mut self, stat: impl Into<String>) -> &mut Self {
        self.stats.push(stat.into());
        self
    }

    /// Whether nothing was added
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

impl Display for StatsPrinter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stats.join(", "))
    }
}
