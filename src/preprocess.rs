// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use anyhow::{ensure, Context, Result};
use fast_image_resize as fr;
use image::{DynamicImage, RgbImage};
use ndarray::{Array, IxDyn};

use crate::ort_backend::TensorLayout;

/// Pads the image on the bottom/right only, to a square of side
/// `max(width, height)`, zero fill. Returns the canvas and the two padding
/// ratios `(square / width, square / height)` that map model-space
/// coordinates back to source space.
///
/// The source must be non-empty.
pub fn pad_to_square(img: &RgbImage) -> (RgbImage, f32, f32) {
    let (w0, h0) = img.dimensions();
    let square = w0.max(h0);
    let mut canvas = RgbImage::new(square, square);
    image::imageops::replace(&mut canvas, img, 0, 0);
    let x_ratio = square as f32 / w0 as f32;
    let y_ratio = square as f32 / h0 as f32;
    (canvas, x_ratio, y_ratio)
}

/// Turns a source image into the model input tensor.
///
/// Square-pads, resizes to `(width, height)` with bilinear interpolation,
/// scales pixel values into `[0, 1]` and lays them out with a leading batch
/// dimension of 1, channel-first or channel-last per `layout`.
pub fn preprocess(
    source: &DynamicImage,
    width: u32,
    height: u32,
    layout: TensorLayout,
) -> Result<(Array<f32, IxDyn>, f32, f32)> {
    let img = source.to_rgb8();
    let (w0, h0) = img.dimensions();
    ensure!(w0 > 0 && h0 > 0, "empty source image");

    let (canvas, x_ratio, y_ratio) = pad_to_square(&img);
    let square = canvas.width();

    let src = fr::images::ImageRef::new(square, square, canvas.as_raw(), fr::PixelType::U8x3)
        .context("resize source buffer")?;
    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);
    let mut resizer = fr::Resizer::new();
    let options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
    resizer
        .resize(&src, &mut dst, Some(&options))
        .context("bilinear resize")?;

    let (w, h) = (width as usize, height as usize);
    let mut ys = match layout {
        TensorLayout::Nchw => Array::zeros(IxDyn(&[1, 3, h, w])),
        TensorLayout::Nhwc => Array::zeros(IxDyn(&[1, h, w, 3])),
    };
    for (i, px) in dst.buffer().chunks_exact(3).enumerate() {
        let (y, x) = (i / w, i % w);
        match layout {
            TensorLayout::Nchw => {
                ys[[0, 0, y, x]] = px[0] as f32 / 255.0;
                ys[[0, 1, y, x]] = px[1] as f32 / 255.0;
                ys[[0, 2, y, x]] = px[2] as f32 / 255.0;
            }
            TensorLayout::Nhwc => {
                ys[[0, y, x, 0]] = px[0] as f32 / 255.0;
                ys[[0, y, x, 1]] = px[1] as f32 / 255.0;
                ys[[0, y, x, 2]] = px[2] as f32 / 255.0;
            }
        }
    }

    Ok((ys, x_ratio, y_ratio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_pad_lands_bottom_right() {
        // 2x1 image: red then green, padded to 2x2
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        let (canvas, x_ratio, y_ratio) = pad_to_square(&img);
        assert_eq!(canvas.dimensions(), (2, 2));
        assert_eq!(canvas.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(canvas.get_pixel(1, 0), &Rgb([0, 255, 0]));
        // padded band is zero
        assert_eq!(canvas.get_pixel(0, 1), &Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(1, 1), &Rgb([0, 0, 0]));
        assert!((x_ratio - 1.0).abs() < 1e-6);
        assert!((y_ratio - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_ratios_for_landscape_source() {
        // 640x480 source: square is 640, so x stays 1.0 and y gets 4/3
        let img = RgbImage::new(640, 480);
        let (canvas, x_ratio, y_ratio) = pad_to_square(&img);
        assert_eq!(canvas.dimensions(), (640, 640));
        assert!((x_ratio - 1.0).abs() < 1e-6);
        assert!((y_ratio - 640.0 / 480.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_shape_and_range_nhwc() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 4, Rgb([128, 128, 128])));
        let (ys, x_ratio, y_ratio) = preprocess(&img, 4, 4, TensorLayout::Nhwc).unwrap();
        assert_eq!(ys.shape(), &[1, 4, 4, 3]);
        assert!(ys.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!((x_ratio - 1.0).abs() < 1e-6);
        assert!((y_ratio - 2.0).abs() < 1e-6);
        // top rows come straight from the gray image, bottom rows from the pad
        assert!((ys[[0, 0, 0, 0]] - 128.0 / 255.0).abs() < 1e-6);
        assert!(ys[[0, 3, 0, 0]].abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_channel_order_nchw() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 4, Rgb([255, 0, 0])));
        let (ys, _, _) = preprocess(&img, 4, 4, TensorLayout::Nchw).unwrap();
        assert_eq!(ys.shape(), &[1, 3, 4, 4]);
        // red in channel 0 only, and only in the image rows
        assert!((ys[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(ys[[0, 1, 0, 0]].abs() < 1e-6);
        assert!(ys[[0, 2, 0, 0]].abs() < 1e-6);
        assert!(ys[[0, 0, 3, 0]].abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_rejects_empty() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(preprocess(&img, 4, 4, TensorLayout::Nchw).is_err());
    }
}
