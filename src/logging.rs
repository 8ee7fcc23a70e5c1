// Logging setup
// env_logger with LOG_LEVEL from the environment, overridable from the CLI

use env_logger::{Builder, Env, WriteStyle};
use log::LevelFilter;

const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

pub fn init(cli_filter: Option<&str>) {
    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Warn)
        .parse_env(Env::new().filter(LOG_LEVEL_ENV))
        .format_timestamp(None)
        .format_target(false)
        .write_style(write_style());

    if let Some(filter) = cli_filter {
        builder.parse_filters(filter);
    }

    builder.init();
}

fn write_style() -> WriteStyle {
    if atty::is(atty::Stream::Stderr) {
        WriteStyle::Always
    } else {
        WriteStyle::Never
    }
}
