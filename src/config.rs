//! Server configuration from command line flags and environment

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "timed")]
#[command(about = "Time tracking server: report booking, review and export")]
#[command(version)]
pub struct Config {
    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:timed.db")]
    pub database_url: String,

    /// Address to listen on
    #[arg(long, env = "TIMED_BIND", default_value = "0.0.0.0:3000")]
    pub bind: String,

    /// Largest export allowed; 0 or less means unlimited
    #[arg(long, env = "REPORTS_EXPORT_MAX_COUNT", default_value_t = 0, allow_negative_numbers = true)]
    pub export_max_count: i64,

    /// Sender address of notification mails
    #[arg(long, env = "TIMED_FROM_EMAIL", default_value = "webmaster@localhost")]
    pub from_email: String,

    #[arg(long, env = "TIMED_EMAIL_SUBJECT_PREFIX", default_value = "[Timed] ")]
    pub email_subject_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:timed.db".to_string(),
            bind: "0.0.0.0:3000".to_string(),
            export_max_count: 0,
            from_email: "webmaster@localhost".to_string(),
            email_subject_prefix: "[Timed] ".to_string(),
        }
    }
}
