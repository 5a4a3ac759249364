use super::{
    require_video, Outcome, TransformEngine, REPLACE_AUDIO_BITRATE_KBPS,
    REPLACE_VIDEO_BITRATE_KBPS,
};
use crate::error::MediaError;
use crate::paths::{derived_path, extension_of, scratch_path, MediaPath};
use crate::probe;
use crate::progress::ProgressSink;
use crate::reconcile::reconcile;
use crate::scratch::ScratchFiles;
use crate::tool::Invocation;
use std::path::Path;
use tracing::info;

/// Decodes the audio of `input` to 16-bit 44.1 kHz stereo WAV.
fn build_pcm_extract(input: &Path) -> Invocation {
    let mut inv = Invocation::ffmpeg();
    inv.arg("-i")
        .arg(input)
        .args(["-vn", "-acodec", "pcm_s16le", "-ar", "44100", "-ac", "2"]);
    inv
}

fn build_mux(video: &Path, audio: &Path, reencode: Option<&str>) -> Invocation {
    let mut inv = Invocation::ffmpeg();
    inv.arg("-i")
        .arg(video)
        .arg("-i")
        .arg(audio)
        .args(["-map", "0:v:0", "-map", "1:a:0"]);
    match reencode {
        Some(vcodec) => {
            inv.args(["-c:v", vcodec])
                .arg("-b:v")
                .arg(format!("{}k", REPLACE_VIDEO_BITRATE_KBPS))
                .args(["-c:a", "aac"])
                .arg("-b:a")
                .arg(format!("{}k", REPLACE_AUDIO_BITRATE_KBPS));
        }
        None => {
            inv.args(["-c:v", "copy", "-c:a", "aac"]);
        }
    }
    inv
}

impl TransformEngine {
    pub(super) fn audio_replace(
        &self,
        video: &MediaPath,
        audio: &MediaPath,
        compress: bool,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Outcome, MediaError> {
        require_video(video)?;
        self.replace_track(video, &audio.path, "__replace.mp4", compress, progress)
    }

    /// Fits `audio` to the video's duration and muxes it in place of the
    /// original track.
    fn replace_track(
        &self,
        video: &MediaPath,
        audio: &Path,
        suffix: &str,
        compress: bool,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Outcome, MediaError> {
        let target_secs = probe::duration(self.tool(), &video.path)?;

        let mut scratch = ScratchFiles::new();
        let audio_ext = extension_of(audio).unwrap_or_else(|| "mp3".to_string());
        let fitted = scratch.track(scratch_path(
            &video.path,
            &format!("__fitted.{}", audio_ext),
        ));
        reconcile(self.tool(), audio, target_secs, &fitted)?;

        let output = derived_path(&video.path, suffix);
        let reencode = compress.then(|| self.default_codec());
        self.encode(
            build_mux(&video.path, &fitted, reencode),
            &output,
            || Some(target_secs),
            progress,
        )?;

        info!(
            "replaced audio of {} with {} -> {}",
            video.path.display(),
            audio.display(),
            output.display()
        );
        Ok(Outcome::Written(output))
    }

    pub(super) fn audio_combine(
        &self,
        video: &MediaPath,
        audio: &MediaPath,
        compress: bool,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Outcome, MediaError> {
        require_video(video)?;
        let target_secs = probe::duration(self.tool(), &video.path)?;

        let (_, own_audio) = probe::codecs(self.tool(), &video.path)?;
        if own_audio.is_none() {
            info!(
                "{} has no audio track; using {} alone",
                video.path.display(),
                audio.path.display()
            );
            return self.replace_track(video, &audio.path, "__combine.mp4", compress, progress);
        }

        let mut scratch = ScratchFiles::new();
        let own_wav = scratch.track(scratch_path(&video.path, "__video_sound.wav"));
        let external_wav = scratch.track(scratch_path(&video.path, "__ext_sound.wav"));
        let external_fitted = scratch.track(scratch_path(&video.path, "__ext_fitted.wav"));
        let mix = scratch.track(scratch_path(&video.path, "__mix_sound.mp3"));

        let mut extract = build_pcm_extract(&video.path);
        extract.arg(&own_wav);
        self.tool().run(&extract)?;

        let mut decode = build_pcm_extract(&audio.path);
        decode.arg(&external_wav);
        self.tool().run(&decode)?;

        reconcile(self.tool(), &external_wav, target_secs, &external_fitted)?;
        self.mixer.mix(self.tool(), &own_wav, &external_fitted, &mix)?;

        self.replace_track(video, &mix, "__combine.mp4", compress, progress)
    }
}
