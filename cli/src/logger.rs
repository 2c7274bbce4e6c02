use std::io::Write as _;

use checker_core::style::ColorTheme as _;
use colored::Colorize as _;

/// Logs go to stderr, `warn` and above unless `RUST_LOG` says otherwise.
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format(|buf, record| {
            let level = record.level();
            writeln!(
                buf,
                "{}: {}",
                level.to_string().color(level.color()).bold(),
                record.args()
            )
        })
        .init();
}
