//! External media tools (ffprobe, ffmpeg) and the generic runner shared with
//! the player bridge.
//!
//! Every call is bounded by a timeout; on expiry the child is killed and the
//! call reports [`ToolError::Timeout`].

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },
    #[error("{tool} exited with {code:?}: {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("unexpected output from {tool}: {output:?}")]
    Parse { tool: String, output: String },
}

/// Run `program` to completion with captured output.
///
/// A non-zero exit is an error carrying the trimmed stderr.
pub async fn run_tool<I, S>(program: &Path, args: I, timeout: Duration) -> Result<Output, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let tool = program.display().to_string();
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => return Err(ToolError::Spawn { tool, source }),
        Err(_) => return Err(ToolError::Timeout { tool, after: timeout }),
    };

    if !output.status.success() {
        return Err(ToolError::Failed {
            tool,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

/// Covers are scaled down to at most 230 pixels wide, keeping the aspect ratio.
const COVER_SCALE: &str = "scale='min(230,iw)':-2";

/// Locations of the inspection tools plus the per-call time limit.
#[derive(Debug, Clone)]
pub struct MediaTools {
    pub ffprobe: PathBuf,
    pub ffmpeg: PathBuf,
    pub timeout: Duration,
}

impl Default for MediaTools {
    fn default() -> Self {
        Self {
            ffprobe: PathBuf::from("ffprobe"),
            ffmpeg: PathBuf::from("ffmpeg"),
            timeout: Duration::from_secs(30),
        }
    }
}

impl MediaTools {
    /// Container duration in whole seconds (fraction truncated).
    pub async fn probe_duration(&self, video: &Path) -> Result<u64, ToolError> {
        let args: [&OsStr; 9] = [
            "-v".as_ref(),
            "error".as_ref(),
            "-select_streams".as_ref(),
            "v:0".as_ref(),
            "-show_entries".as_ref(),
            "format=duration".as_ref(),
            "-of".as_ref(),
            "default=noprint_wrappers=1:nokey=1".as_ref(),
            video.as_os_str(),
        ];
        let output = run_tool(&self.ffprobe, args, self.timeout).await?;
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        parse_seconds(&text).ok_or_else(|| ToolError::Parse {
            tool: self.ffprobe.display().to_string(),
            output: text,
        })
    }

    /// Grab one 192x108 WebP frame at `timestamp` (`HH:MM:SS`) into `out`.
    pub async fn extract_frame(&self, video: &Path, timestamp: &str, out: &Path) -> Result<(), ToolError> {
        let args: [&OsStr; 22] = [
            "-y".as_ref(),
            "-loglevel".as_ref(),
            "error".as_ref(),
            "-ss".as_ref(),
            timestamp.as_ref(),
            "-i".as_ref(),
            video.as_os_str(),
            "-frames:v".as_ref(),
            "1".as_ref(),
            "-vf".as_ref(),
            "scale=192:108".as_ref(),
            "-c:v".as_ref(),
            "libwebp".as_ref(),
            "-lossless".as_ref(),
            "0".as_ref(),
            "-q:v".as_ref(),
            "80".as_ref(),
            "-loop".as_ref(),
            "0".as_ref(),
            "-an".as_ref(),
            "-f".as_ref(),
            "webp".as_ref(),
        ];
        run_tool(
            &self.ffmpeg,
            args.iter().copied().chain(std::iter::once(out.as_os_str())),
            self.timeout,
        )
        .await?;
        Ok(())
    }

    /// Re-encode the downloaded cover at `image` as a small WebP into `out`.
    pub async fn shrink_cover(&self, image: &Path, out: &Path) -> Result<(), ToolError> {
        let args: [&OsStr; 15] = [
            "-y".as_ref(),
            "-loglevel".as_ref(),
            "error".as_ref(),
            "-i".as_ref(),
            image.as_os_str(),
            "-frames:v".as_ref(),
            "1".as_ref(),
            "-vf".as_ref(),
            COVER_SCALE.as_ref(),
            "-c:v".as_ref(),
            "libwebp".as_ref(),
            "-q:v".as_ref(),
            "75".as_ref(),
            "-f".as_ref(),
            "webp".as_ref(),
        ];
        run_tool(
            &self.ffmpeg,
            args.iter().copied().chain(std::iter::once(out.as_os_str())),
            self.timeout,
        )
        .await?;
        Ok(())
    }
}

fn parse_seconds(text: &str) -> Option<u64> {
    let secs: f64 = text.parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| secs as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ffprobe_output() {
        assert_eq!(parse_seconds("1425.504000"), Some(1425));
        assert_eq!(parse_seconds("N/A"), None);
        assert_eq!(parse_seconds("-3"), None);
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let err = run_tool(
            Path::new("/nonexistent/tool"),
            ["--version"],
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_times_out() {
        let err = run_tool(Path::new("sleep"), ["5"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let err = run_tool(Path::new("false"), Vec::<&str>::new(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed { code: Some(1), .. }));
    }
}
