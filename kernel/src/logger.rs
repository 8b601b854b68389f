//! Logger backend for the `log` facade
//!
//! Formats records into a stack buffer, no allocation, and hands each
//! line to a console sink registered by the embedding kernel.

use core::fmt::Write;

use log::{Level, LevelFilter, Metadata, Record};
use spin::Once;

/// Console output function supplied by the embedder
pub type ConsoleSink = fn(&[u8]);

const LINE_MAX: usize = 512;

static SINK: Once<ConsoleSink> = Once::new();

/// Logger writing to the registered sink
struct SinkLogger;

impl log::Log for SinkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(sink) = SINK.get() else { return };

        // Format: [LEVEL] message
        let level_str = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let mut buf = [0u8; LINE_MAX];
        let pos = {
            let mut writer = BufferWriter { buffer: &mut buf, pos: 0 };
            let _ = write!(&mut writer, "[{}] {}\n", level_str, record.args());
            writer.pos
        };
        sink(&buf[..pos]);
    }

    fn flush(&self) {}
}

/// Buffer writer for formatting without alloc. Output beyond the
/// buffer is dropped.
pub struct BufferWriter<'a> {
    pub buffer: &'a mut [u8],
    pub pos: usize,
}

impl<'a> core::fmt::Write for BufferWriter<'a> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buffer.len() - self.pos;
        let to_write = bytes.len().min(remaining);

        if to_write > 0 {
            self.buffer[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
        }

        Ok(())
    }
}

static LOGGER: SinkLogger = SinkLogger;

/// Install the logger, sending lines up to `level` to `sink`.
///
/// The first sink registered stays in place. Fails if another `log`
/// backend was installed first.
pub fn init(sink: ConsoleSink, level: LevelFilter) -> Result<(), log::SetLoggerError> {
    SINK.call_once(|| sink);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Log at DEBUG level
#[inline]
pub fn debug(msg: &str) {
    log::debug!("{}", msg);
}

/// Log at INFO level
#[inline]
pub fn info(msg: &str) {
    log::info!("{}", msg);
}

/// Log at WARN level
#[inline]
pub fn warn(msg: &str) {
    log::warn!("{}", msg);
}

/// Log at ERROR level
#[inline]
pub fn error(msg: &str) {
    log::error!("{}", msg);
}
