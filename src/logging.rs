//! env_logger setup: compact `time level target message` lines, crate prefix stripped.

use std::io::Write;

const TARGET_PREFIX: &str = "video_thumbnails::";

fn short_target(target: &str) -> &str {
    target.strip_prefix(TARGET_PREFIX).unwrap_or(target)
}

/// Installs the logger. Honours `RUST_LOG`, defaulting to `info`.
///
/// Returns false when a logger was already installed.
pub fn init_logger() -> bool {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{ts}  {level:5}  {target:5}  {message}",
                ts = buf.timestamp_seconds(),
                level = record.level(),
                target = short_target(record.target()),
                message = record.args()
            )
        })
        .try_init()
        .is_ok()
}
