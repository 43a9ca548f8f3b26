//! Host logging sink: stderr with a single-letter priority prefix. On
//! Android the embedding HAL routes the `log` facade into the system log
//! instead, so everything here stays behind `try_init`.

use log::Level;
use std::io::Write;

pub fn init(filter: &str) {
    let _ = env_logger::Builder::new()
        .parse_filters(filter)
        .format(|buf, record| {
            let priority = match record.level() {
                Level::Error => "E",
                Level::Warn => "W",
                Level::Info => "I",
                Level::Debug => "D",
                Level::Trace => "V",
            };
            writeln!(buf, "<{priority}> {}", record.args())
        })
        .try_init();
}
