use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::png::PngDecoder;
use image::{DynamicImage, ImageDecoder};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::{Cursor, Write};

use crate::error::{ComposeError, Result};
use crate::header::parse_jpeg_header;
use crate::source::{ImageSource, SourceFormat};

/// Embedded ICC profile, zlib-compressed and ready for an ICCBased stream.
pub struct IccProfile {
    components: u8,
    data: Vec<u8>,
}

impl IccProfile {
    /// Keep `raw` only when its color space matches the image's component count.
    pub fn for_components(raw: &[u8], components: u8) -> std::io::Result<Option<Self>> {
        if icc_components(raw) != Some(components) {
            return Ok(None);
        }
        Ok(Some(Self {
            components,
            data: deflate(raw.to_vec(), true)?,
        }))
    }

    fn into_color_space(self, doc: &mut Document) -> Object {
        let stream = Stream::new(
            dictionary! {
                "N" => self.components as i64,
                "Filter" => "FlateDecode",
            },
            self.data,
        );
        let icc_id = doc.add_object(stream);
        Object::Array(vec![Object::Name(b"ICCBased".to_vec()), icc_id.into()])
    }
}

/// component count of the profile's data color space (header bytes 16..20)
fn icc_components(raw: &[u8]) -> Option<u8> {
    match raw.get(16..20)? {
        b"GRAY" => Some(1),
        b"RGB " => Some(3),
        b"CMYK" => Some(4),
        _ => None,
    }
}

/// image data ready for PDF insertion
pub enum PreparedImage {
    /// DCT data copied as-is
    Jpeg {
        width: u32,
        height: u32,
        components: u8,
        invert_cmyk: bool,
        icc: Option<IccProfile>,
        data: Vec<u8>,
    },
    /// 8-bit samples, Flate compressed when `compressed`
    Pixels {
        width: u32,
        height: u32,
        color_channels: u8,
        icc: Option<IccProfile>,
        color: Vec<u8>,
        alpha: Option<Vec<u8>>,
        compressed: bool,
    },
}

impl PreparedImage {
    /// add the image (and its soft mask) to `doc` as an Image XObject
    pub fn into_xobject(self, doc: &mut Document) -> ObjectId {
        match self {
            PreparedImage::Jpeg {
                width,
                height,
                components,
                invert_cmyk,
                icc,
                data,
            } => {
                let color_space = match icc {
                    Some(icc) => icc.into_color_space(doc),
                    None => device_color_space(components),
                };
                let mut dict = dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => color_space,
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                    "Length" => data.len() as i64,
                };
                if invert_cmyk {
                    dict.set(
                        "Decode",
                        Object::Array([1, 0, 1, 0, 1, 0, 1, 0].into_iter().map(Object::Integer).collect()),
                    );
                }
                doc.add_object(Stream::new(dict, data))
            }
            PreparedImage::Pixels {
                width,
                height,
                color_channels,
                icc,
                color,
                alpha,
                compressed,
            } => {
                let color_space = match icc {
                    Some(icc) => icc.into_color_space(doc),
                    None => device_color_space(color_channels),
                };
                let mut dict = sample_dict(width, height, color_space, compressed, color.len());
                if let Some(alpha) = alpha {
                    let smask = Stream::new(
                        sample_dict(width, height, device_color_space(1), compressed, alpha.len()),
                        alpha,
                    );
                    dict.set("SMask", doc.add_object(smask));
                }
                doc.add_object(Stream::new(dict, color))
            }
        }
    }
}

fn device_color_space(components: u8) -> Object {
    match components {
        1 => Object::Name(b"DeviceGray".to_vec()),
        4 => Object::Name(b"DeviceCMYK".to_vec()),
        _ => Object::Name(b"DeviceRGB".to_vec()),
    }
}

fn sample_dict(width: u32, height: u32, color_space: Object, compressed: bool, len: usize) -> lopdf::Dictionary {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Length" => len as i64,
    };
    if compressed {
        dict.set("Filter", "FlateDecode");
    }
    dict
}

/// zlib-compress `data` when `compress` is set, otherwise hand it back untouched
pub(crate) fn deflate(data: Vec<u8>, compress: bool) -> std::io::Result<Vec<u8>> {
    if !compress {
        return Ok(data);
    }
    let mut enc = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    enc.write_all(&data)?;
    enc.finish()
}

/// Read and convert one source image for embedding.
///
/// JPEG files are passed through as DCT streams. PNG files are decoded and
/// split into color samples plus an optional alpha mask. An embedded ICC
/// profile is carried over when it fits the embedded color data.
pub fn prepare_image(source: &ImageSource, compress: bool) -> Result<PreparedImage> {
    let path = source.path();
    let data = std::fs::read(path).map_err(|e| ComposeError::OpenFailure {
        path: path.to_path_buf(),
        source: e,
    })?;

    match source.format() {
        SourceFormat::Jpeg => {
            let header = parse_jpeg_header(&data).map_err(|e| ComposeError::decode(path, e))?;
            if !matches!(header.components, 1 | 3 | 4) {
                return Err(ComposeError::decode(
                    path,
                    format!("Unsupported JPEG component count {}", header.components),
                ));
            }
            let icc = match &header.icc_profile {
                Some(raw) => IccProfile::for_components(raw, header.components)
                    .map_err(|e| ComposeError::decode(path, e))?,
                None => None,
            };
            Ok(PreparedImage::Jpeg {
                width: header.width,
                height: header.height,
                components: header.components,
                invert_cmyk: header.inverted_cmyk(),
                icc,
                data,
            })
        }
        SourceFormat::Png => {
            let mut decoder = PngDecoder::new(Cursor::new(&data)).map_err(|e| ComposeError::decode(path, e))?;
            let profile = decoder.icc_profile().map_err(|e| ComposeError::decode(path, e))?;
            let img = DynamicImage::from_decoder(decoder).map_err(|e| ComposeError::decode(path, e))?;
            decode_pixels(img, profile.as_deref(), compress).map_err(|e| ComposeError::decode(path, e))
        }
        SourceFormat::Unsupported(_) => Err(source.unsupported()),
    }
}

fn decode_pixels(img: DynamicImage, profile: Option<&[u8]>, compress: bool) -> std::io::Result<PreparedImage> {
    let (width, height) = (img.width(), img.height());
    let color = img.color();
    let color_channels: u8 = if color.channel_count() <= 2 { 1 } else { 3 };
    let icc = match profile {
        Some(raw) => IccProfile::for_components(raw, color_channels)?,
        None => None,
    };

    if color.has_alpha() {
        let samples = if color_channels == 1 {
            img.into_luma_alpha8().into_raw()
        } else {
            img.into_rgba8().into_raw()
        };
        let channels = color_channels as usize + 1;
        let pixel_count = (width as usize) * (height as usize);
        let mut color_samples = Vec::with_capacity(pixel_count * (channels - 1));
        let mut alpha_samples = Vec::with_capacity(pixel_count);
        for px in samples.chunks_exact(channels) {
            color_samples.extend_from_slice(&px[..channels - 1]);
            alpha_samples.push(px[channels - 1]);
        }
        return Ok(PreparedImage::Pixels {
            width,
            height,
            color_channels,
            icc,
            color: deflate(color_samples, compress)?,
            alpha: Some(deflate(alpha_samples, compress)?),
            compressed: compress,
        });
    }

    let samples = if color_channels == 1 {
        img.into_luma8().into_raw()
    } else {
        img.into_rgb8().into_raw()
    };
    Ok(PreparedImage::Pixels {
        width,
        height,
        color_channels,
        icc,
        color: deflate(samples, compress)?,
        alpha: None,
        compressed: compress,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tmp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("imgpdf_embed_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn jpeg_is_passed_through() {
        let dir = tmp_dir("jpeg");
        let path = dir.join("a.jpg");
        image::RgbImage::from_fn(8, 6, |x, y| image::Rgb([(x * 30) as u8, (y * 40) as u8, 90]))
            .save(&path)
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        match prepare_image(&ImageSource::new(&path), true).unwrap() {
            PreparedImage::Jpeg {
                width,
                height,
                components,
                invert_cmyk,
                icc,
                data,
            } => {
                assert_eq!((width, height, components), (8, 6, 3));
                assert!(!invert_cmyk);
                assert!(icc.is_none());
                assert_eq!(data, bytes);
            }
            PreparedImage::Pixels { .. } => panic!("expected passthrough"),
        }
    }

    #[test]
    fn rgba_png_splits_alpha() {
        let dir = tmp_dir("rgba");
        let path = dir.join("a.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 40])).save(&path).unwrap();
        match prepare_image(&ImageSource::new(&path), false).unwrap() {
            PreparedImage::Pixels {
                color_channels,
                color,
                alpha,
                compressed,
                ..
            } => {
                assert_eq!(color_channels, 3);
                assert!(!compressed);
                assert_eq!(color, [10u8, 20, 30].repeat(6));
                assert_eq!(alpha.unwrap(), vec![40u8; 6]);
            }
            PreparedImage::Jpeg { .. } => panic!("expected pixels"),
        }
    }

    #[test]
    fn gray_png_stays_gray() {
        let dir = tmp_dir("gray");
        let path = dir.join("g.png");
        image::GrayImage::from_pixel(5, 5, image::Luma([77])).save(&path).unwrap();
        match prepare_image(&ImageSource::new(&path), true).unwrap() {
            PreparedImage::Pixels {
                width,
                height,
                color_channels,
                alpha,
                compressed,
                ..
            } => {
                assert_eq!((width, height), (5, 5));
                assert_eq!(color_channels, 1);
                assert!(alpha.is_none());
                assert!(compressed);
            }
            PreparedImage::Jpeg { .. } => panic!("expected pixels"),
        }
    }

    #[test]
    fn truncated_jpeg_is_a_decode_failure() {
        let dir = tmp_dir("truncated");
        let path = dir.join("cut.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0, 0x00]).unwrap();
        assert!(matches!(
            prepare_image(&ImageSource::new(&path), true),
            Err(ComposeError::DecodeFailure { .. })
        ));
    }

    #[test]
    fn xobject_filters_follow_compression() {
        let mut doc = Document::with_version("1.5");
        let raw = PreparedImage::Pixels {
            width: 1,
            height: 1,
            color_channels: 3,
            icc: None,
            color: vec![1, 2, 3],
            alpha: None,
            compressed: false,
        };
        let id = raw.into_xobject(&mut doc);
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(stream.dict.get(b"Filter").is_err());

        let packed = PreparedImage::Pixels {
            width: 1,
            height: 1,
            color_channels: 1,
            icc: None,
            color: deflate(vec![9], true).unwrap(),
            alpha: Some(deflate(vec![255], true).unwrap()),
            compressed: true,
        };
        let id = packed.into_xobject(&mut doc);
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name_str().unwrap(), "FlateDecode");
        assert_eq!(stream.dict.get(b"ColorSpace").unwrap().as_name_str().unwrap(), "DeviceGray");
        assert!(stream.dict.get(b"SMask").is_ok());
    }

    /// minimal profile header: size, then the data color space at offset 16
    fn fake_profile(space: &[u8; 4]) -> Vec<u8> {
        let mut profile = vec![0u8; 132];
        profile[..4].copy_from_slice(&132u32.to_be_bytes());
        profile[16..20].copy_from_slice(space);
        profile
    }

    /// splice an APP2 ICC_PROFILE segment right after SOI
    fn with_icc_segment(jpeg: &[u8], profile: &[u8]) -> Vec<u8> {
        let mut payload = b"ICC_PROFILE\0".to_vec();
        payload.extend_from_slice(&[1, 1]);
        payload.extend_from_slice(profile);
        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE2]);
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    fn icc_n(doc: &Document, color_space: &Object) -> i64 {
        let arr = color_space.as_array().unwrap();
        assert_eq!(arr[0].as_name_str().unwrap(), "ICCBased");
        let icc = doc.get_object(arr[1].as_reference().unwrap()).unwrap().as_stream().unwrap();
        icc.dict.get(b"N").unwrap().as_i64().unwrap()
    }

    #[test]
    fn jpeg_icc_profile_becomes_iccbased() {
        let dir = tmp_dir("jpeg_icc");
        let plain = dir.join("plain.jpg");
        image::RgbImage::from_pixel(4, 4, image::Rgb([10, 200, 30])).save(&plain).unwrap();
        let bytes = std::fs::read(&plain).unwrap();

        let tagged = dir.join("tagged.jpg");
        std::fs::write(&tagged, with_icc_segment(&bytes, &fake_profile(b"RGB "))).unwrap();
        let mut doc = Document::with_version("1.5");
        let id = prepare_image(&ImageSource::new(&tagged), true)
            .unwrap()
            .into_xobject(&mut doc);
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert_eq!(icc_n(&doc, stream.dict.get(b"ColorSpace").unwrap()), 3);

        // a gray profile does not describe RGB data and is dropped
        let mismatched = dir.join("mismatched.jpg");
        std::fs::write(&mismatched, with_icc_segment(&bytes, &fake_profile(b"GRAY"))).unwrap();
        let id = prepare_image(&ImageSource::new(&mismatched), true)
            .unwrap()
            .into_xobject(&mut doc);
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert_eq!(stream.dict.get(b"ColorSpace").unwrap().as_name_str().unwrap(), "DeviceRGB");
    }

    #[test]
    fn png_icc_profile_is_kept() {
        use std::io::BufWriter;

        let dir = tmp_dir("png_icc");
        let path = dir.join("tagged.png");
        let file = std::fs::File::create(&path).unwrap();
        let mut info = png::Info::with_size(2, 2);
        info.color_type = png::ColorType::Grayscale;
        info.bit_depth = png::BitDepth::Eight;
        info.icc_profile = Some(fake_profile(b"GRAY").into());
        let encoder = png::Encoder::with_info(BufWriter::new(file), info).unwrap();
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[1, 2, 3, 4]).unwrap();
        writer.finish().unwrap();

        let mut doc = Document::with_version("1.5");
        let id = prepare_image(&ImageSource::new(&path), false)
            .unwrap()
            .into_xobject(&mut doc);
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert_eq!(icc_n(&doc, stream.dict.get(b"ColorSpace").unwrap()), 1);
        assert_eq!(stream.content, vec![1, 2, 3, 4]);
    }
}
