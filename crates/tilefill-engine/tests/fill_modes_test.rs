//! End-to-end tests for the fill modes: color fill, until-color, external
//! destinations, selection masks, clear-non-zero and group split.

use std::sync::Arc;

use tilefill_core::{
    Color, ColorSpaceRef, Gray8, GrayAlpha8, Point, Rect, Rgba8, Rgba16, RgbaF32, TiledDevice,
};
use tilefill_engine::{ScanlineFill, ThreadedJobExecutor};

fn executor() -> Arc<ThreadedJobExecutor> {
    Arc::new(ThreadedJobExecutor::new())
}

fn gray_device(offset: Point) -> Arc<TiledDevice> {
    TiledDevice::new(Arc::new(Gray8), offset)
}

fn assert_gray_region(device: &TiledDevice, rect: Rect, value: u8) {
    for y in rect.top()..rect.bottom() {
        for x in rect.left()..rect.right() {
            assert_eq!(
                device.pixel_color(Point::new(x, y)).as_bytes(),
                &[value],
                "pixel ({x}, {y})"
            );
        }
    }
}

#[test]
fn test_simple_rectangular_fill() {
    // 160x160 canvas of 200 with a 128x128 inner block of 10; filling the
    // inner block must not leak into the surround.
    let canvas = gray_device(Point::new(0, 0));
    let full = Rect::new(0, 0, 160, 160);
    let inner = Rect::new(16, 16, 128, 128);
    canvas.fill_rect(full, &Color::gray(200)).unwrap();
    canvas.fill_rect(inner, &Color::gray(10)).unwrap();

    let mut fill = ScanlineFill::new(canvas.clone(), Point::new(48, 48), full, executor());
    fill.set_threshold(5);
    fill.set_opacity_spread(100);
    fill.fill(&Color::gray(99)).unwrap();

    assert_gray_region(&canvas, inner, 99);
    assert_gray_region(&canvas, Rect::new(0, 0, 160, 16), 200);
    assert_gray_region(&canvas, Rect::new(0, 0, 16, 160), 200);
    assert_gray_region(&canvas, Rect::new(144, 0, 16, 160), 200);
    assert_gray_region(&canvas, Rect::new(0, 144, 160, 16), 200);
}

#[test]
fn test_fill_until_color_barrier() {
    // A single row of the boundary color divides the canvas; only the
    // seed's side is filled and the barrier row itself is untouched.
    let canvas = gray_device(Point::new(0, 0));
    let full = Rect::new(0, 0, 160, 160);
    canvas.fill_rect(full, &Color::gray(10)).unwrap();
    canvas
        .fill_rect(Rect::new(0, 80, 160, 1), &Color::gray(200))
        .unwrap();

    let mut fill = ScanlineFill::new(canvas.clone(), Point::new(32, 32), full, executor());
    fill.set_threshold(0);
    fill.fill_until_color(&Color::gray(99), &Color::gray(200)).unwrap();

    assert_gray_region(&canvas, Rect::new(0, 0, 160, 80), 99);
    assert_gray_region(&canvas, Rect::new(0, 80, 160, 1), 200);
    assert_gray_region(&canvas, Rect::new(0, 81, 160, 79), 10);
}

#[test]
fn test_misaligned_external_device() {
    // External device offset by (1, 1): its tile grid disagrees with the
    // reference grid, but the written values must be position-identical.
    let reference = gray_device(Point::new(0, 0));
    let region = Rect::new(0, 0, 128, 128);
    reference.fill_rect(region, &Color::gray(10)).unwrap();
    let external = gray_device(Point::new(1, 1));

    let fill = ScanlineFill::new(reference.clone(), Point::new(0, 0), region, executor());
    fill.fill_into(&Color::gray(77), &external).unwrap();

    assert_gray_region(&external, region, 77);
    assert_gray_region(&reference, region, 10);
}

#[test]
fn test_aligned_and_misaligned_external_agree() {
    let reference = gray_device(Point::new(0, 0));
    let region = Rect::new(0, 0, 150, 90);
    reference.fill_rect(region, &Color::gray(10)).unwrap();
    // Carve a hole the fill must route around.
    reference
        .fill_rect(Rect::new(40, 20, 30, 50), &Color::gray(200))
        .unwrap();

    let aligned = gray_device(Point::new(64, 128));
    let misaligned = gray_device(Point::new(-7, 13));

    let fill = ScanlineFill::new(reference.clone(), Point::new(2, 2), region, executor());
    fill.fill_into(&Color::gray(55), &aligned).unwrap();
    let fill = ScanlineFill::new(reference, Point::new(2, 2), region, executor());
    fill.fill_into(&Color::gray(55), &misaligned).unwrap();

    for y in region.top()..region.bottom() {
        for x in region.left()..region.right() {
            assert_eq!(
                aligned.pixel_color(Point::new(x, y)).as_bytes(),
                misaligned.pixel_color(Point::new(x, y)).as_bytes(),
                "external devices disagree at ({x}, {y})"
            );
        }
    }
}

#[test]
fn test_fill_until_color_into_external() {
    let reference = gray_device(Point::new(0, 0));
    let full = Rect::new(0, 0, 96, 96);
    reference.fill_rect(full, &Color::gray(10)).unwrap();
    reference
        .fill_rect(Rect::new(0, 48, 96, 2), &Color::gray(222))
        .unwrap();
    let external = gray_device(Point::new(9, 9));

    let mut fill = ScanlineFill::new(reference.clone(), Point::new(10, 10), full, executor());
    fill.set_threshold(0);
    fill.fill_until_color_into(&Color::gray(50), &Color::gray(222), &external)
        .unwrap();

    // Only the seed's side of the barrier lands in the external device;
    // the reference never changes.
    assert_gray_region(&external, Rect::new(0, 0, 96, 48), 50);
    assert_gray_region(&external, Rect::new(0, 48, 96, 48), 0);
    assert_gray_region(&reference, Rect::new(0, 0, 96, 48), 10);
    assert_gray_region(&reference, Rect::new(0, 48, 96, 2), 222);
}

#[test]
fn test_soft_selection_ramp() {
    // Horizontal ramp; threshold 100 with full softness. Expected opacity
    // for value v < 100 is (100 - v) * 255 * 100 / (100 * 100).
    let reference = gray_device(Point::new(0, 0));
    let rect = Rect::new(0, 0, 16, 1);
    for i in 0..16 {
        reference
            .set_pixel_color(Point::new(i, 0), &Color::gray((i * 17) as u8))
            .unwrap();
    }
    let mask = gray_device(Point::new(0, 0));

    let mut fill = ScanlineFill::new(reference, Point::new(0, 0), rect, executor());
    fill.set_threshold(100);
    fill.set_opacity_spread(0);
    fill.fill_selection(&mask).unwrap();

    for i in 0..16i32 {
        let v = (i * 17) as u32;
        let expected = if v < 100 {
            ((100 - v) * 255 * 100 / (100 * 100)).min(255) as u8
        } else {
            0
        };
        assert_eq!(
            mask.pixel_color(Point::new(i, 0)).as_bytes(),
            &[expected],
            "mask at ramp value {v}"
        );
    }
}

#[test]
fn test_hard_selection_mask_is_binary() {
    let reference = gray_device(Point::new(0, 0));
    let rect = Rect::new(0, 0, 96, 96);
    reference.fill_rect(rect, &Color::gray(10)).unwrap();
    reference
        .fill_rect(Rect::new(50, 0, 8, 96), &Color::gray(250))
        .unwrap();
    let mask = gray_device(Point::new(0, 0));

    let mut fill = ScanlineFill::new(reference, Point::new(5, 5), rect, executor());
    fill.set_threshold(30);
    fill.set_opacity_spread(100);
    fill.fill_selection(&mask).unwrap();

    for y in 0..96 {
        for x in 0..96 {
            let m = mask.pixel_color(Point::new(x, y)).as_bytes()[0];
            assert!(m == 0 || m == 255, "hard mask value {m} at ({x}, {y})");
            let expected = x < 50;
            assert_eq!(m == 255, expected, "coverage at ({x}, {y})");
        }
    }
}

#[test]
fn test_selection_with_boundary_encloses_fill() {
    let reference = gray_device(Point::new(0, 0));
    let rect = Rect::new(0, 0, 128, 128);
    reference.fill_rect(rect, &Color::gray(10)).unwrap();

    // Boundary selection permits only a centered square.
    let boundary = gray_device(Point::new(0, 0));
    let permitted = Rect::new(30, 30, 40, 40);
    boundary.fill_rect(permitted, &Color::gray(255)).unwrap();

    let mask = gray_device(Point::new(0, 0));
    let mut fill = ScanlineFill::new(reference, Point::new(45, 45), rect, executor());
    fill.set_opacity_spread(100);
    fill.fill_selection_with_boundary(&mask, &boundary).unwrap();

    for y in 0..128 {
        for x in 0..128 {
            let inside = permitted.contains(x, y);
            let m = mask.pixel_color(Point::new(x, y)).as_bytes()[0];
            assert_eq!(m == 255, inside, "boundary-clipped mask at ({x}, {y})");
        }
    }
}

#[test]
fn test_selection_with_boundary_masking_out_seed_fills_nothing() {
    let reference = gray_device(Point::new(0, 0));
    let rect = Rect::new(0, 0, 64, 64);
    reference.fill_rect(rect, &Color::gray(10)).unwrap();
    let boundary = gray_device(Point::new(0, 0)); // all zero
    let mask = gray_device(Point::new(0, 0));

    let mut fill = ScanlineFill::new(reference, Point::new(10, 10), rect, executor());
    fill.set_opacity_spread(100);
    fill.fill_selection_with_boundary(&mask, &boundary).unwrap();

    assert_gray_region(&mask, rect, 0);
}

#[test]
fn test_selection_unaligned_mask_and_boundary() {
    // Mask and boundary both live on shifted grids; results must match the
    // aligned run value for value.
    let reference = gray_device(Point::new(0, 0));
    let rect = Rect::new(0, 0, 100, 100);
    reference.fill_rect(rect, &Color::gray(10)).unwrap();

    let permitted = Rect::new(10, 10, 60, 45);
    let run = |mask_offset: Point, boundary_offset: Point| {
        let boundary = gray_device(boundary_offset);
        boundary.fill_rect(permitted, &Color::gray(128)).unwrap();
        let mask = gray_device(mask_offset);
        let mut fill =
            ScanlineFill::new(reference.clone(), Point::new(20, 20), rect, executor());
        fill.set_opacity_spread(100);
        fill.fill_selection_with_boundary(&mask, &boundary).unwrap();
        mask
    };

    let aligned = run(Point::new(0, 0), Point::new(0, 0));
    let shifted = run(Point::new(3, -5), Point::new(-11, 17));

    for y in 0..100 {
        for x in 0..100 {
            assert_eq!(
                aligned.pixel_color(Point::new(x, y)).as_bytes(),
                shifted.pixel_color(Point::new(x, y)).as_bytes(),
                "mask alignment mismatch at ({x}, {y})"
            );
        }
    }
}

#[test]
fn test_fill_selection_until_color() {
    let reference = gray_device(Point::new(0, 0));
    let rect = Rect::new(0, 0, 96, 32);
    reference.fill_rect(rect, &Color::gray(10)).unwrap();
    reference
        .fill_rect(Rect::new(60, 0, 2, 32), &Color::gray(222))
        .unwrap();
    let mask = gray_device(Point::new(0, 0));

    let mut fill = ScanlineFill::new(reference, Point::new(0, 0), rect, executor());
    fill.set_threshold(0);
    fill.set_opacity_spread(100);
    fill.fill_selection_until_color(&mask, &Color::gray(222), None)
        .unwrap();

    for y in 0..32 {
        for x in 0..96 {
            let expected = x < 60;
            let m = mask.pixel_color(Point::new(x, y)).as_bytes()[0];
            assert_eq!(m == 255, expected, "until-color mask at ({x}, {y})");
        }
    }
}

#[test]
fn test_fill_selection_until_color_or_transparent() {
    // A transparent moat around the seed acts as a boundary even though
    // its color channels differ wildly from the reference color.
    let colorspace: ColorSpaceRef = Arc::new(Rgba8);
    let reference = TiledDevice::new(colorspace, Point::new(0, 0));
    let rect = Rect::new(0, 0, 60, 60);
    reference
        .fill_rect(rect, &Color::rgba8(10, 10, 10, 255))
        .unwrap();
    // Transparent ring enclosing (20..40)^2.
    for ring in [
        Rect::new(18, 18, 24, 2),
        Rect::new(18, 40, 24, 2),
        Rect::new(18, 20, 2, 20),
        Rect::new(40, 20, 2, 20),
    ] {
        reference.fill_rect(ring, &Color::rgba8(9, 99, 9, 0)).unwrap();
    }
    let mask = TiledDevice::new(Arc::new(Gray8), Point::new(0, 0));

    let mut fill = ScanlineFill::new(reference, Point::new(30, 30), rect, executor());
    fill.set_threshold(10);
    fill.set_opacity_spread(100);
    fill.fill_selection_until_color_or_transparent(&mask, &Color::rgba8(200, 0, 0, 255), None)
        .unwrap();

    // Inside the moat: selected. On and beyond the moat: not.
    assert_eq!(mask.pixel_color(Point::new(30, 30)).as_bytes(), &[255]);
    assert_eq!(mask.pixel_color(Point::new(39, 39)).as_bytes(), &[255]);
    assert_eq!(mask.pixel_color(Point::new(30, 18)).as_bytes(), &[0]);
    assert_eq!(mask.pixel_color(Point::new(30, 5)).as_bytes(), &[0]);
    assert_eq!(mask.pixel_color(Point::new(50, 30)).as_bytes(), &[0]);
}

#[test]
fn test_clear_non_zero() {
    let canvas = gray_device(Point::new(0, 0));
    let rect = Rect::new(0, 0, 128, 64);
    // Two disjoint non-zero components.
    canvas.fill_rect(Rect::new(4, 4, 40, 40), &Color::gray(30)).unwrap();
    canvas
        .fill_rect(Rect::new(20, 10, 10, 10), &Color::gray(77))
        .unwrap();
    canvas
        .fill_rect(Rect::new(80, 4, 30, 30), &Color::gray(50))
        .unwrap();

    let fill = ScanlineFill::new(canvas.clone(), Point::new(6, 6), rect, executor());
    fill.clear_non_zero().unwrap();

    // The seed's component (including the differently-valued island inside
    // it) is cleared; the other component survives.
    assert_gray_region(&canvas, Rect::new(4, 4, 40, 40), 0);
    assert_gray_region(&canvas, Rect::new(80, 4, 30, 30), 50);
}

#[test]
fn test_clear_non_zero_twice_is_idempotent() {
    let canvas = gray_device(Point::new(0, 0));
    let rect = Rect::new(0, 0, 64, 64);
    canvas.fill_rect(Rect::new(10, 10, 20, 20), &Color::gray(9)).unwrap();

    let fill = ScanlineFill::new(canvas.clone(), Point::new(15, 15), rect, executor());
    fill.clear_non_zero().unwrap();
    assert_gray_region(&canvas, Rect::new(10, 10, 20, 20), 0);

    // The second run finds a zero seed and writes nothing.
    let fill = ScanlineFill::new(canvas.clone(), Point::new(15, 15), rect, executor());
    fill.clear_non_zero().unwrap();
    assert_gray_region(&canvas, rect, 0);
}

#[test]
fn test_fill_contiguous_group() {
    let scribble = gray_device(Point::new(0, 0));
    let rect = Rect::new(0, 0, 128, 128);
    let blob_a = Rect::new(2, 2, 30, 30);
    let blob_b = Rect::new(60, 2, 20, 20);
    let blob_c = Rect::new(2, 70, 25, 25);
    scribble.fill_rect(blob_a, &Color::gray(100)).unwrap();
    scribble.fill_rect(blob_b, &Color::gray(150)).unwrap();
    scribble.fill_rect(blob_c, &Color::gray(200)).unwrap();

    let group_map = TiledDevice::new(Arc::new(Rgba8), Point::new(0, 0));

    let fill = ScanlineFill::new(scribble.clone(), Point::new(10, 10), rect, executor());
    fill.fill_contiguous_group(&group_map, 7).unwrap();

    for y in rect.top()..rect.bottom() {
        for x in rect.left()..rect.right() {
            let p = Point::new(x, y);
            let in_a = blob_a.contains(x, y);
            let expected_scribble = if in_a {
                0
            } else if blob_b.contains(x, y) {
                150
            } else if blob_c.contains(x, y) {
                200
            } else {
                0
            };
            assert_eq!(
                scribble.pixel_color(p).as_bytes(),
                &[expected_scribble],
                "scribble at ({x}, {y})"
            );

            let group = i32::from_ne_bytes(group_map.pixel_color(p).as_bytes().try_into().unwrap());
            assert_eq!(group, if in_a { 7 } else { 0 }, "group map at ({x}, {y})");
        }
    }
}

#[test]
fn test_group_split_on_misaligned_group_map() {
    let scribble = gray_device(Point::new(0, 0));
    let rect = Rect::new(0, 0, 96, 96);
    let blob = Rect::new(30, 30, 50, 40);
    scribble.fill_rect(blob, &Color::gray(120)).unwrap();

    let group_map = TiledDevice::new(Arc::new(Rgba8), Point::new(5, -3));

    let fill = ScanlineFill::new(scribble.clone(), Point::new(40, 40), rect, executor());
    fill.fill_contiguous_group(&group_map, 3).unwrap();

    assert_gray_region(&scribble, blob, 0);
    for y in rect.top()..rect.bottom() {
        for x in rect.left()..rect.right() {
            let group = i32::from_ne_bytes(
                group_map
                    .pixel_color(Point::new(x, y))
                    .as_bytes()
                    .try_into()
                    .unwrap(),
            );
            assert_eq!(group, if blob.contains(x, y) { 3 } else { 0 });
        }
    }
}

#[test]
fn test_wider_pixel_formats() {
    // 2-byte gray+alpha.
    let reference = TiledDevice::new(Arc::new(GrayAlpha8), Point::new(0, 0));
    let rect = Rect::new(0, 0, 80, 80);
    reference.fill_rect(rect, &Color::gray_alpha(10, 255)).unwrap();
    let mut fill = ScanlineFill::new(reference.clone(), Point::new(1, 1), rect, executor());
    fill.set_threshold(3);
    fill.fill(&Color::gray_alpha(90, 255)).unwrap();
    assert_eq!(
        reference.pixel_color(Point::new(70, 70)).as_bytes(),
        Color::gray_alpha(90, 255).as_bytes()
    );

    // 8-byte RGBA16.
    let reference = TiledDevice::new(Arc::new(Rgba16), Point::new(0, 0));
    reference
        .fill_rect(rect, &Color::rgba16(1000, 1000, 1000, u16::MAX))
        .unwrap();
    let mut fill = ScanlineFill::new(reference.clone(), Point::new(1, 1), rect, executor());
    fill.set_threshold(3);
    fill.fill(&Color::rgba16(60000, 0, 0, u16::MAX)).unwrap();
    assert_eq!(
        reference.pixel_color(Point::new(79, 79)).as_bytes(),
        Color::rgba16(60000, 0, 0, u16::MAX).as_bytes()
    );

    // 16-byte float RGBA exercises the non-memoized path.
    let reference = TiledDevice::new(Arc::new(RgbaF32), Point::new(0, 0));
    reference
        .fill_rect(rect, &Color::rgbaf32(0.25, 0.25, 0.25, 1.0))
        .unwrap();
    let mut fill = ScanlineFill::new(reference.clone(), Point::new(1, 1), rect, executor());
    fill.set_threshold(3);
    fill.fill(&Color::rgbaf32(1.0, 0.0, 0.0, 1.0)).unwrap();
    assert_eq!(
        reference.pixel_color(Point::new(40, 40)).as_bytes(),
        Color::rgbaf32(1.0, 0.0, 0.0, 1.0).as_bytes()
    );
}

#[test]
fn test_contract_errors() {
    let reference = gray_device(Point::new(0, 0));
    let rect = Rect::new(10, 10, 20, 20);

    // Seed outside the working rectangle.
    let fill = ScanlineFill::new(reference.clone(), Point::new(0, 0), rect, executor());
    assert!(fill.fill(&Color::gray(1)).is_err());

    // Fill color width mismatch.
    let fill = ScanlineFill::new(reference.clone(), Point::new(15, 15), rect, executor());
    assert!(fill.fill(&Color::rgba8(1, 2, 3, 4)).is_err());

    // Group map must carry 4-byte pixels.
    let bad_map = gray_device(Point::new(0, 0));
    assert!(fill.fill_contiguous_group(&bad_map, 1).is_err());

    // Group split needs a 1-byte reference.
    let rgba_reference = TiledDevice::new(Arc::new(Rgba8), Point::new(0, 0));
    let map = TiledDevice::new(Arc::new(Rgba8), Point::new(0, 0));
    let fill = ScanlineFill::new(rgba_reference, Point::new(15, 15), rect, executor());
    assert!(fill.fill_contiguous_group(&map, 1).is_err());

    // Masks must be single-byte.
    let fill = ScanlineFill::new(reference, Point::new(15, 15), rect, executor());
    let bad_mask = TiledDevice::new(Arc::new(Rgba8), Point::new(0, 0));
    assert!(fill.fill_selection(&bad_mask).is_err());
}

#[test]
fn test_empty_fill_when_seed_rejected() {
    // Seed sits on the boundary color: the initial selection test fails
    // and nothing is written.
    let canvas = gray_device(Point::new(0, 0));
    let rect = Rect::new(0, 0, 64, 64);
    canvas.fill_rect(rect, &Color::gray(200)).unwrap();

    let mut fill = ScanlineFill::new(canvas.clone(), Point::new(5, 5), rect, executor());
    fill.set_threshold(0);
    fill.fill_until_color(&Color::gray(99), &Color::gray(200)).unwrap();

    assert_gray_region(&canvas, rect, 200);
}
