//! Parser for ffmpeg's `-progress pipe:2` output.
//!
//! ffmpeg writes `key=value` lines and closes each block with
//! `progress=continue` or `progress=end`. The parser accumulates the keys it
//! cares about and yields one [`EngineProgress`] per block.

/// Engine-reported position at the end of one progress block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineProgress {
    /// Seconds of output written so far.
    pub out_secs: f64,
    pub fps: Option<f64>,
    /// Processing speed relative to real time (`1.5` for `1.5x`).
    pub speed: Option<f64>,
    /// Whether this is the final block.
    pub done: bool,
}

#[derive(Debug, Default)]
pub struct FfmpegProgressParser {
    out_time_us: Option<i64>,
    fps: Option<f64>,
    speed: Option<f64>,
}

impl FfmpegProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stderr line. Returns a snapshot when the line closes a block.
    pub fn feed(&mut self, line: &str) -> Option<EngineProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key {
            "out_time_us" | "out_time_ms" => {
                // ffmpeg reports both keys in microseconds.
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_us = Some(us.max(0));
                }
            }
            "fps" => self.fps = value.parse().ok(),
            "speed" => {
                self.speed = value
                    .strip_suffix('x')
                    .and_then(|v| v.trim().parse().ok());
            }
            "progress" => {
                return Some(EngineProgress {
                    out_secs: self.out_time_us.unwrap_or(0) as f64 / 1_000_000.0,
                    fps: self.fps,
                    speed: self.speed,
                    done: value == "end",
                });
            }
            _ => {}
        }
        None
    }
}
