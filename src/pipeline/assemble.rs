//! Image-to-PDF assembly.
//!
//! Each accepted frame becomes one page whose MediaBox equals the image size
//! in pixels (1 px = 1 pt); captures of slightly different heights therefore
//! keep their own page size. Pixels are embedded losslessly as 8-bit
//! DeviceRGB streams compressed with `FlateDecode`.
//!
//! The document is serialised into a temporary file next to the target and
//! renamed into place, so a failed run never leaves a truncated PDF behind.
//! Decoding and compression are CPU-bound and run under `spawn_blocking`.

use crate::error::ExtractError;
use crate::output::CaptureFrame;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Write `frames` as a PDF at `output_path`, one page per frame in ascending
/// index order.
///
/// # Errors
/// * [`ExtractError::Assembly`] if `frames` is empty or a frame cannot be
///   decoded. No file is created in that case.
/// * [`ExtractError::OutputWriteFailed`] if the file cannot be written.
pub async fn assemble(
    frames: Vec<CaptureFrame>,
    output_path: &Path,
) -> Result<PathBuf, ExtractError> {
    let path = output_path.to_path_buf();
    tokio::task::spawn_blocking(move || assemble_blocking(frames, &path))
        .await
        .map_err(|e| ExtractError::Internal(format!("PDF assembly task panicked: {}", e)))?
}

fn assemble_blocking(
    mut frames: Vec<CaptureFrame>,
    output_path: &Path,
) -> Result<PathBuf, ExtractError> {
    let total = frames.len();
    if frames.is_empty() {
        return Err(ExtractError::Assembly {
            frames: 0,
            detail: "no frames to assemble".into(),
        });
    }
    frames.sort_by_key(|f| f.index);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(total);

    for frame in &frames {
        let page_id = add_page(&mut doc, pages_id, frame).map_err(|detail| {
            ExtractError::Assembly {
                frames: total,
                detail: format!("frame {}: {}", frame.index, detail),
            }
        })?;
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => total as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    write_atomic(&mut doc, output_path)?;
    info!("Wrote {} page(s) to {}", total, output_path.display());
    Ok(output_path.to_path_buf())
}

/// Embed one frame as an image XObject on its own page.
fn add_page(doc: &mut Document, pages_id: ObjectId, frame: &CaptureFrame) -> Result<ObjectId, String> {
    let rgb = image::load_from_memory(&frame.png)
        .map_err(|e| format!("cannot decode image: {e}"))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err("image has no pixels".into());
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(rgb.as_raw())
        .map_err(|e| format!("compression failed: {e}"))?;
    let compressed = encoder
        .finish()
        .map_err(|e| format!("compression failed: {e}"))?;
    debug!(
        "Frame {}: {}x{} px, {} -> {} bytes",
        frame.index,
        width,
        height,
        rgb.as_raw().len(),
        compressed.len()
    );

    let image_id = doc.add_object(
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "FlateDecode",
            },
            compressed,
        )
        .with_compression(false),
    );

    let (w, h) = (width as i64, height as i64);
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(w),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(h),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content
        .encode()
        .map_err(|e| format!("content stream: {e}"))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content_bytes));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(w),
            Object::Integer(h),
        ],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    }))
}

/// Serialise into a temp sibling, then rename over `path`.
fn write_atomic(doc: &mut Document, path: &Path) -> Result<(), ExtractError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let write_err = |source: std::io::Error| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".webdoc2pdf-")
        .suffix(".pdf.tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;
    doc.save_to(tmp.as_file_mut()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
