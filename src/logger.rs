use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Env};

/// Info-level logging with local timestamps. `RUST_LOG` overrides the level.
pub fn init() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}
