use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::EncodeError;
use crate::frame::{Frame, PixelFormat};

use super::job::ArtifactMetadata;

pub const SEGMENT_EXTENSION: &str = "bseg";

const SEGMENT_MAGIC: &[u8; 4] = b"BSEG";
const SEGMENT_VERSION: u8 = 1;

/// Writes one evidence segment to disk.
///
/// Video encoding proper is a collaborator concern; implementations only need
/// to persist the frames under `path` and report the bytes written.
pub trait ArtifactEncoder: Send + Sync {
    fn extension(&self) -> &'static str;

    fn encode(&self, frames: &[Frame], fps: u32, path: &Path) -> Result<u64, EncodeError>;
}

/// Uncompressed segment container.
///
/// Layout (little endian): magic `BSEG`, version u8, fps u32, frame count u32,
/// then per frame: sequence u64, capture time ms u64, width u32, height u32,
/// pixel format u8, byte length u32, pixel bytes.
///
/// Files are written under a temporary name and renamed into place, so a
/// reader never sees a half-written segment.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawSegmentEncoder;

impl ArtifactEncoder for RawSegmentEncoder {
    fn extension(&self) -> &'static str {
        SEGMENT_EXTENSION
    }

    fn encode(&self, frames: &[Frame], fps: u32, path: &Path) -> Result<u64, EncodeError> {
        if frames.is_empty() {
            return Err(EncodeError::EmptySegment);
        }
        let count = u32::try_from(frames.len())
            .map_err(|_| EncodeError::Corrupt("too many frames in one segment".to_string()))?;
        let tmp = tmp_path(path);
        let mut out = BufWriter::new(File::create(&tmp)?);
        let mut written = 0u64;

        out.write_all(SEGMENT_MAGIC)?;
        out.write_all(&[SEGMENT_VERSION])?;
        out.write_all(&fps.to_le_bytes())?;
        out.write_all(&count.to_le_bytes())?;
        written += 13;

        for frame in frames {
            let captured_ms = capture_time_ms(frame.captured_at);
            let len = u32::try_from(frame.byte_len())
                .map_err(|_| EncodeError::Corrupt("frame exceeds 4 GiB".to_string()))?;
            out.write_all(&frame.sequence.to_le_bytes())?;
            out.write_all(&captured_ms.to_le_bytes())?;
            out.write_all(&frame.width.to_le_bytes())?;
            out.write_all(&frame.height.to_le_bytes())?;
            out.write_all(&[frame.format.code()])?;
            out.write_all(&len.to_le_bytes())?;
            out.write_all(frame.pixels())?;
            written += 33 + len as u64;
        }
        out.flush()?;
        drop(out);
        std::fs::rename(&tmp, path)?;
        Ok(written)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read back a segment written by `RawSegmentEncoder`. Returns `(fps, frames)`.
pub fn read_segment(path: &Path) -> Result<(u32, Vec<Frame>), EncodeError> {
    let mut input = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    if &magic != SEGMENT_MAGIC {
        return Err(EncodeError::Corrupt("bad magic".to_string()));
    }
    let version = read_u8(&mut input)?;
    if version != SEGMENT_VERSION {
        return Err(EncodeError::Corrupt(format!("unsupported version {}", version)));
    }
    let fps = read_u32(&mut input)?;
    let count = read_u32(&mut input)?;
    let mut frames = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let sequence = read_u64(&mut input)?;
        let captured_ms = read_u64(&mut input)?;
        let width = read_u32(&mut input)?;
        let height = read_u32(&mut input)?;
        let format = PixelFormat::from_code(read_u8(&mut input)?)
            .ok_or_else(|| EncodeError::Corrupt("unknown pixel format".to_string()))?;
        let len = read_u32(&mut input)? as usize;
        let mut data = vec![0u8; len];
        input.read_exact(&mut data)?;
        let frame = Frame::new(data, width, height, format, sequence)
            .map_err(|e| EncodeError::Corrupt(e.to_string()))?
            .with_capture_time(UNIX_EPOCH + Duration::from_millis(captured_ms));
        frames.push(frame);
    }
    Ok((fps, frames))
}

/// Write `metadata` as pretty JSON next to the segment (`<segment>.json`).
pub(crate) fn write_sidecar(segment: &Path, metadata: &ArtifactMetadata) -> Result<PathBuf, EncodeError> {
    let path = segment.with_extension("json");
    let json = serde_json::to_vec_pretty(metadata)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

fn capture_time_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn read_u8(input: &mut impl Read) -> Result<u8, EncodeError> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32(input: &mut impl Read) -> Result<u32, EncodeError> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(input: &mut impl Read) -> Result<u64, EncodeError> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_preserves_frames_and_capture_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aggression_x_part1.bseg");
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let frames: Vec<Frame> = (0..3)
            .map(|seq| {
                Frame::new(vec![seq as u8; 12], 2, 2, PixelFormat::Rgb24, seq)
                    .unwrap()
                    .with_capture_time(at)
            })
            .collect();

        let bytes = RawSegmentEncoder.encode(&frames, 15, &path).unwrap();
        assert_eq!(bytes, std::fs::metadata(&path).unwrap().len());
        assert!(!tmp_path(&path).exists());

        let (fps, back) = read_segment(&path).unwrap();
        assert_eq!(fps, 15);
        assert_eq!(back.len(), 3);
        assert_eq!(back[2].pixels(), frames[2].pixels());
        assert_eq!(back[1].sequence, 1);
        assert_eq!(back[0].captured_at, at);
        assert_eq!(back[0].format, PixelFormat::Rgb24);
    }

    #[test]
    fn empty_segment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = RawSegmentEncoder.encode(&[], 10, &dir.path().join("x.bseg"));
        assert!(matches!(err, Err(EncodeError::EmptySegment)));
    }

    #[test]
    fn corrupt_segment_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bseg");
        std::fs::write(&path, b"NOPE0000000000").unwrap();
        assert!(matches!(read_segment(&path), Err(EncodeError::Corrupt(_))));
    }
}
