//! Image-file frame source.
//!
//! Each frame is a decoded image converted to grayscale. Face boxes come from
//! an optional `<frame>.faces.json` sidecar holding an array of bounding
//! boxes; without one the whole image is treated as a single face.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rollcall_core::{BoundingBox, Frame};

pub fn sidecar_path(frame: &Path) -> PathBuf {
    let mut name = OsString::from(frame.as_os_str());
    name.push(".faces.json");
    PathBuf::from(name)
}

pub fn load_frame(path: &Path) -> Result<(Frame, Vec<BoundingBox>)> {
    let image = image::open(path).with_context(|| format!("decoding {}", path.display()))?;
    let frame = Frame::from_image(&image);
    let faces = load_faces(&sidecar_path(path))?.unwrap_or_else(|| vec![frame.full_box()]);
    tracing::debug!(
        path = %path.display(),
        width = frame.width,
        height = frame.height,
        faces = faces.len(),
        "frame loaded"
    );
    Ok((frame, faces))
}

fn load_faces(sidecar: &Path) -> Result<Option<Vec<BoundingBox>>> {
    if !sidecar.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(sidecar)
        .with_context(|| format!("reading {}", sidecar.display()))?;
    let faces = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", sidecar.display()))?;
    Ok(Some(faces))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir() -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(1);
        let dir = std::env::temp_dir().join(format!("rollcall-source-{suffix}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_sidecar_path_appends_suffix() {
        assert_eq!(
            sidecar_path(Path::new("/frames/0001.png")),
            PathBuf::from("/frames/0001.png.faces.json")
        );
    }

    #[test]
    fn test_frame_without_sidecar_is_one_face() {
        let dir = temp_dir();
        let path = dir.join("face.png");
        GrayImage::from_fn(20, 10, |x, _| Luma([(x * 10) as u8]))
            .save(&path)
            .unwrap();

        let (frame, faces) = load_frame(&path).unwrap();
        assert_eq!((frame.width, frame.height), (20, 10));
        assert_eq!(faces, vec![BoundingBox::new(0.0, 0.0, 20.0, 10.0)]);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_sidecar_boxes_are_used() {
        let dir = temp_dir();
        let path = dir.join("frame.png");
        GrayImage::new(40, 40).save(&path).unwrap();
        std::fs::write(
            sidecar_path(&path),
            r#"[{"x": 2, "y": 3, "width": 10, "height": 12},
                {"x": 20, "y": 20, "width": 8, "height": 8, "confidence": 0.7}]"#,
        )
        .unwrap();

        let (_, faces) = load_frame(&path).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0], BoundingBox::new(2.0, 3.0, 10.0, 12.0));
        assert_eq!(faces[1].confidence, 0.7);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
