use super::{require_media, require_video, Outcome, TransformEngine};
use crate::error::MediaError;
use crate::paths::{derived_path, MediaPath};
use crate::progress::ProgressSink;
use crate::tool::Invocation;
use tracing::info;

const REVERB_FILTER: &str = "aecho=0.8:0.9:1000:0.6";
const BASE_SAMPLE_RATE: f64 = 44100.0;

fn upscale_filter(factor: u32) -> String {
    format!(
        "scale=iw*{f}:ih*{f}:flags=lanczos,unsharp=5:5:1.0:5:5:0.0,hqdn3d=4",
        f = factor
    )
}

/// `asetrate` lowers pitch and tempo together; resampling back keeps the
/// output playable at the usual rate.
fn deep_voice_filter(rate: f64) -> String {
    format!(
        "asetrate={},aresample={}",
        (BASE_SAMPLE_RATE * rate).round() as u32,
        BASE_SAMPLE_RATE as u32
    )
}

impl TransformEngine {
    pub(super) fn upscale(
        &self,
        input: &MediaPath,
        factor: u32,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Outcome, MediaError> {
        require_video(input)?;
        if factor < 2 {
            return Err(MediaError::InvalidParameter(format!(
                "upscale factor must be at least 2, got {}",
                factor
            )));
        }

        let output = derived_path(&input.path, &format!("__up{}.mp4", factor));
        let mut inv = Invocation::ffmpeg();
        inv.arg("-i")
            .arg(&input.path)
            .arg("-vf")
            .arg(upscale_filter(factor))
            .args(["-c:v", self.default_codec(), "-c:a", "copy"]);

        self.encode(inv, &output, || self.duration_hint(&input.path), progress)?;
        info!("upscaled {} x{} -> {}", input.path.display(), factor, output.display());
        Ok(Outcome::Written(output))
    }

    pub(super) fn reverb(
        &self,
        input: &MediaPath,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Outcome, MediaError> {
        require_media(input)?;

        let output = derived_path(&input.path, "__reverb.mp3");
        let mut inv = Invocation::ffmpeg();
        inv.arg("-i")
            .arg(&input.path)
            .args(["-vn", "-af", REVERB_FILTER, "-c:a", "libmp3lame", "-q:a", "2"]);

        self.encode(inv, &output, || self.duration_hint(&input.path), progress)?;
        info!("added reverb to {} -> {}", input.path.display(), output.display());
        Ok(Outcome::Written(output))
    }

    pub(super) fn deep_voice(
        &self,
        input: &MediaPath,
        rate: f64,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Outcome, MediaError> {
        require_media(input)?;
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(MediaError::InvalidParameter(format!(
                "deep voice rate must be in (0, 1], got {}",
                rate
            )));
        }

        let output = derived_path(&input.path, &format!("__deep{}.mp3", rate));
        let mut inv = Invocation::ffmpeg();
        inv.arg("-i")
            .arg(&input.path)
            .arg("-vn")
            .arg("-af")
            .arg(deep_voice_filter(rate))
            .args(["-c:a", "libmp3lame", "-q:a", "2"]);

        // slowed playback stretches the output by 1/rate
        self.encode(
            inv,
            &output,
            || self.duration_hint(&input.path).map(|d| d / rate),
            progress,
        )?;
        info!("deepened {} -> {}", input.path.display(), output.display());
        Ok(Outcome::Written(output))
    }
}
