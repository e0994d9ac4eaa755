//! Session configuration.

/// Options applied to every session a factory opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Log executed SQL at `info` instead of `debug`.
    pub show_sql: bool,
    /// Reject JQL paths that name nothing on the queried entity.
    pub strict_jql: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            show_sql: false,
            strict_jql: true,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show_sql(mut self, show_sql: bool) -> Self {
        self.show_sql = show_sql;
        self
    }

    pub fn strict_jql(mut self, strict: bool) -> Self {
        self.strict_jql = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_setters() {
        let config = SessionConfig::default();
        assert!(!config.show_sql);
        assert!(config.strict_jql);

        let config = SessionConfig::new().show_sql(true).strict_jql(false);
        assert!(config.show_sql);
        assert!(!config.strict_jql);
    }
}
