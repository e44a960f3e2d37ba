//! Bulk conversion of image assets between formats.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat};
use serde::Serialize;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif", "tiff"];
pub const DEFAULT_QUALITY: u8 = 85;

#[derive(Debug, thiserror::Error)]
pub enum ImageJobError {
    #[error("directory not found: {0}")]
    MissingDirectory(PathBuf),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("unsupported target format {0:?} (expected one of png, jpg, jpeg, webp, bmp, gif, tiff)")]
    UnsupportedFormat(String),
    #[error("{path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Png,
    Jpeg,
    Webp,
    Bmp,
    Gif,
    Tiff,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Png => "png",
            TargetFormat::Jpeg => "jpg",
            TargetFormat::Webp => "webp",
            TargetFormat::Bmp => "bmp",
            TargetFormat::Gif => "gif",
            TargetFormat::Tiff => "tiff",
        }
    }

    /// Whether a file with this extension is already in the format.
    pub fn matches_extension(self, ext: &str) -> bool {
        ext.parse::<TargetFormat>().is_ok_and(|format| format == self)
    }

    fn image_format(self) -> ImageFormat {
        match self {
            TargetFormat::Png => ImageFormat::Png,
            TargetFormat::Jpeg => ImageFormat::Jpeg,
            TargetFormat::Webp => ImageFormat::WebP,
            TargetFormat::Bmp => ImageFormat::Bmp,
            TargetFormat::Gif => ImageFormat::Gif,
            TargetFormat::Tiff => ImageFormat::Tiff,
        }
    }
}

impl FromStr for TargetFormat {
    type Err = ImageJobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Ok(TargetFormat::Png),
            "jpg" | "jpeg" => Ok(TargetFormat::Jpeg),
            "webp" => Ok(TargetFormat::Webp),
            "bmp" => Ok(TargetFormat::Bmp),
            "gif" => Ok(TargetFormat::Gif),
            "tif" | "tiff" => Ok(TargetFormat::Tiff),
            _ => Err(ImageJobError::UnsupportedFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversionOptions {
    pub target: TargetFormat,
    /// JPEG quality, 1-100. WebP output is always lossless.
    pub quality: u8,
    pub delete_originals: bool,
    pub dry_run: bool,
}

impl ConversionOptions {
    pub fn new(target: TargetFormat) -> Self {
        Self {
            target,
            quality: DEFAULT_QUALITY,
            delete_originals: false,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionReport {
    pub found: usize,
    pub already_in_format: usize,
    pub converted: Vec<(PathBuf, PathBuf)>,
    pub deleted: usize,
    pub errors: Vec<String>,
}

pub fn find_images(dir: &Path) -> Vec<PathBuf> {
    let walker = ignore::WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .build();

    let mut images: Vec<PathBuf> = walker
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| extension_of(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str())))
        .collect();
    images.sort();
    images
}

/// Decode `source` and write it next to itself with the target extension.
pub fn convert_image(source: &Path, options: &ConversionOptions) -> Result<PathBuf, ImageJobError> {
    let output = source.with_extension(options.target.extension());
    let img = image::open(source).map_err(|source_err| ImageJobError::Image {
        path: source.to_path_buf(),
        source: source_err,
    })?;
    write_image(&img, &output, options)?;
    Ok(output)
}

fn write_image(img: &DynamicImage, output: &Path, options: &ConversionOptions) -> Result<(), ImageJobError> {
    let file = File::create(output).map_err(|source| ImageJobError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    let result = encode(img, BufWriter::new(file), options.target, options.quality).map_err(|err| match err {
        WriteError::Image(source) => ImageJobError::Image {
            path: output.to_path_buf(),
            source,
        },
        WriteError::Io(source) => ImageJobError::Io {
            path: output.to_path_buf(),
            source,
        },
    });
    if result.is_err() {
        // A partial output must not be mistaken for a converted file.
        if let Err(e) = std::fs::remove_file(output) {
            tracing::warn!("could not remove partial output {}: {e}", output.display());
        }
    }
    result
}

enum WriteError {
    Image(image::ImageError),
    Io(std::io::Error),
}

/// Encode into `writer`, then flush and sync so that a failed write is
/// reported here instead of being dropped with the buffer.
fn encode(
    img: &DynamicImage,
    mut writer: BufWriter<File>,
    target: TargetFormat,
    quality: u8,
) -> Result<(), WriteError> {
    let encoded = match target {
        TargetFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100)))
        }
        TargetFormat::Png => img.write_with_encoder(PngEncoder::new_with_quality(
            &mut writer,
            CompressionType::Best,
            FilterType::Adaptive,
        )),
        TargetFormat::Webp => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(WebPEncoder::new_lossless(&mut writer))
        }
        TargetFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut writer, ImageFormat::Gif),
        other => img.write_to(&mut writer, other.image_format()),
    };
    encoded.map_err(WriteError::Image)?;

    let file = writer.into_inner().map_err(|e| WriteError::Io(e.into_error()))?;
    file.sync_all().map_err(WriteError::Io)
}

/// Convert every image under `dir`. Per-file failures land in the report;
/// only an unusable directory is an error.
pub fn convert_directory(dir: &Path, options: &ConversionOptions) -> Result<ConversionReport, ImageJobError> {
    if !dir.exists() {
        return Err(ImageJobError::MissingDirectory(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ImageJobError::NotADirectory(dir.to_path_buf()));
    }

    let mut report = ConversionReport::default();
    for source in find_images(dir) {
        report.found += 1;
        let already = extension_of(&source).is_some_and(|ext| options.target.matches_extension(&ext));
        if already {
            report.already_in_format += 1;
            continue;
        }

        if options.dry_run {
            let output = source.with_extension(options.target.extension());
            tracing::info!("would convert {} -> {}", source.display(), output.display());
            report.converted.push((source, output));
            continue;
        }

        match convert_image(&source, options) {
            Ok(output) => {
                tracing::debug!("converted {} -> {}", source.display(), output.display());
                if options.delete_originals {
                    match std::fs::remove_file(&source) {
                        Ok(()) => report.deleted += 1,
                        Err(e) => report
                            .errors
                            .push(format!("{}: could not delete: {e}", source.display())),
                    }
                }
                report.converted.push((source, output));
            }
            Err(e) => {
                tracing::warn!("{e}");
                report.errors.push(e.to_string());
            }
        }
    }
    Ok(report)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
