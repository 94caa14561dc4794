//! Cut a window out of a video: trim (explicit bounds) and sample (centred
//! window of fixed length).

use std::path::Path;

use super::{path_arg, FfmpegInvocation};

/// Copy `[start, end)` seconds of `input`.
pub fn trim(input: &Path, output: &Path, start_secs: u64, end_secs: u64) -> FfmpegInvocation {
    let duration = end_secs.saturating_sub(start_secs);
    clip(input, output, start_secs as f64, duration as f64)
}

/// Copy a `duration_secs` window centred on the middle of the input.
pub fn sample(
    input: &Path,
    output: &Path,
    total_secs: Option<f64>,
    duration_secs: u32,
) -> FfmpegInvocation {
    let (start, duration) = sample_window(total_secs, duration_secs);
    clip(input, output, start, duration)
}

/// Start and length of the sample window.
///
/// The window is centred: `start = max(0, (total - duration) / 2)`. Inputs
/// shorter than the window are copied whole; an unknown total starts at 0.
pub fn sample_window(total_secs: Option<f64>, duration_secs: u32) -> (f64, f64) {
    let wanted = f64::from(duration_secs);
    match total_secs {
        Some(total) if total.is_finite() && total > 0.0 => {
            let start = ((total - wanted) / 2.0).max(0.0);
            (start, wanted.min(total))
        }
        _ => (0.0, wanted),
    }
}

fn clip(input: &Path, output: &Path, start: f64, duration: f64) -> FfmpegInvocation {
    FfmpegInvocation {
        args: vec![
            "-ss".into(),
            format_secs(start),
            "-i".into(),
            path_arg(input),
            "-t".into(),
            format_secs(duration),
            "-c".into(),
            "copy".into(),
        ],
        output: output.to_path_buf(),
        expected_secs: Some(duration),
    }
}

fn format_secs(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{secs:.0}")
    } else {
        format!("{secs:.3}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_converts_bounds_to_start_and_length() {
        let inv = trim(Path::new("in.mp4"), Path::new("out.mp4"), 10, 25);
        assert_eq!(inv.args.join(" "), "-ss 10 -i in.mp4 -t 15 -c copy");
        assert_eq!(inv.expected_secs, Some(15.0));
    }

    #[test]
    fn sample_window_is_centred() {
        assert_eq!(sample_window(Some(100.0), 30), (35.0, 30.0));
        assert_eq!(sample_window(Some(61.0), 60), (0.5, 60.0));
    }

    #[test]
    fn short_or_unknown_inputs_start_at_zero() {
        assert_eq!(sample_window(Some(20.0), 30), (0.0, 20.0));
        assert_eq!(sample_window(None, 60), (0.0, 60.0));
        assert_eq!(sample_window(Some(f64::NAN), 30), (0.0, 30.0));
    }

    #[test]
    fn sample_formats_fractional_start() {
        let inv = sample(Path::new("in.mp4"), Path::new("out.mp4"), Some(61.0), 60);
        assert_eq!(inv.args[1], "0.500");
        assert_eq!(inv.args[5], "60");
    }
}
