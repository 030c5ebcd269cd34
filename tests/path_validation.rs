//! Path validation tests: ordered checks, failure reasons, identifiers.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tempfile::tempdir;

use local_file_camera::{derive_identifier, validate_file_path, ValidationError, ValidationResult};

const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

fn reason(path: &Path) -> Option<ValidationError> {
    validate_file_path(path.to_str().expect("utf-8 path")).failure_reason
}

#[test]
fn traversal_wins_over_every_other_check() {
    for path in [
        "/tmp/../etc/passwd.jpg",
        "../cam.jpg",
        "relative/../cam.png",
        "/srv/cam..jpg",
        "/srv/..",
        "..",
    ] {
        assert_eq!(
            validate_file_path(path),
            ValidationResult::failed(ValidationError::DirectoryTraversal),
            "path {path}"
        );
    }
}

#[test]
fn relative_paths_are_rejected() {
    for path in ["cam.jpg", "./cam.jpg", "images/cam.png", ""] {
        assert_eq!(
            validate_file_path(path).failure_reason,
            Some(ValidationError::NotAbsolutePath),
            "path {path:?}"
        );
    }
}

#[test]
fn missing_file_is_not_found() {
    let dir = tempdir().expect("tempdir");
    assert_eq!(
        reason(&dir.path().join("missing.jpg")),
        Some(ValidationError::FileNotFound)
    );
}

#[test]
fn directory_is_not_a_file() {
    let dir = tempdir().expect("tempdir");
    let sub = dir.path().join("frames.jpg");
    fs::create_dir(&sub).expect("mkdir");
    assert_eq!(reason(&sub), Some(ValidationError::NotAFile));
}

#[test]
fn unsupported_extension_is_invalid_format() {
    let dir = tempdir().expect("tempdir");
    for name in ["cam.txt", "cam.webp", "cam", "cam.jpg.bak"] {
        let path = dir.path().join(name);
        fs::write(&path, JPEG_BYTES).expect("write");
        assert_eq!(
            reason(&path),
            Some(ValidationError::InvalidImageFormat),
            "name {name}"
        );
    }
}

#[test]
fn extension_check_is_case_insensitive() {
    let dir = tempdir().expect("tempdir");
    for name in ["cam.JPG", "cam.JpEg", "cam.PNG", "cam.Gif", "cam.BMP"] {
        let path = dir.path().join(name);
        fs::write(&path, JPEG_BYTES).expect("write");
        assert!(validate_file_path(path.to_str().unwrap()).valid, "name {name}");
    }
}

#[test]
fn jpeg_requires_start_of_image_marker() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cam.jpeg");
    fs::write(&path, b"\x89PNG\r\n\x1a\n").expect("write");
    assert_eq!(reason(&path), Some(ValidationError::InvalidImageFile));

    fs::write(&path, [0xFF]).expect("write");
    assert_eq!(reason(&path), Some(ValidationError::InvalidImageFile));
}

#[test]
fn non_jpeg_formats_skip_magic_check() {
    let dir = tempdir().expect("tempdir");
    for name in ["cam.png", "cam.gif", "cam.bmp"] {
        let path = dir.path().join(name);
        fs::write(&path, b"not really an image").expect("write");
        assert!(validate_file_path(path.to_str().unwrap()).valid, "name {name}");
    }
}

#[test]
fn valid_jpeg_passes() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cam.jpg");
    fs::write(&path, JPEG_BYTES).expect("write");
    let result = validate_file_path(path.to_str().unwrap());
    assert_eq!(result, ValidationResult::ok());
    assert!(result.into_result().is_ok());
}

#[test]
fn missing_then_empty_then_jpeg() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cam.jpg");
    assert_eq!(reason(&path), Some(ValidationError::FileNotFound));

    fs::write(&path, b"").expect("create empty");
    assert_eq!(reason(&path), Some(ValidationError::InvalidImageFile));

    fs::write(&path, [0xFF, 0xD8, 0x00, 0x01]).expect("write header");
    assert_eq!(reason(&path), None);
}

#[cfg(unix)]
#[test]
fn unreadable_file_is_rejected() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cam.jpg");
    fs::write(&path, JPEG_BYTES).expect("write");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).expect("chmod");

    // Privileged users can read regardless of mode bits.
    if fs::File::open(&path).is_ok() {
        return;
    }
    assert_eq!(reason(&path), Some(ValidationError::FileNotReadable));
}

#[test]
fn identifier_is_deterministic() {
    let path = "/srv/cameras/front_door.jpg";
    assert_eq!(derive_identifier(path), derive_identifier(path));
    assert_eq!(derive_identifier(path).len(), 16);
    assert_ne!(derive_identifier(path), derive_identifier("/srv/cameras/back_door.jpg"));
}

#[test]
fn identifiers_do_not_collide_over_realistic_paths() {
    let mut seen = HashSet::new();
    for i in 0..12_000 {
        let path = format!("/home/user{}/cameras/cam_{:05}.jpg", i % 37, i);
        assert!(seen.insert(derive_identifier(&path)), "collision at {path}");
    }
}
