//! Decode-side canvas reconstruction: applies each frame's pixels on top of
//! the state its predecessor's disposal method prescribes.

use rgb::RGBA;

use crate::block::{DisposalMethod, Frame};
use crate::error::DecodeError;
use crate::palette::Palette;

const TRANSPARENT: RGBA<u8> = RGBA {
    r: 0,
    g: 0,
    b: 0,
    a: 0,
};

/// Disposal bookkeeping for the most recently composited frame.
struct Pending {
    left: u16,
    top: u16,
    width: u16,
    height: u16,
    disposal: DisposalMethod,
    /// What `Background` disposal clears the region to.
    clear_color: RGBA<u8>,
    /// Region content captured before the frame was drawn. Taken only when
    /// the frame declared `Previous` disposal.
    snapshot: Option<Vec<RGBA<u8>>>,
}

/// The persistent output canvas plus one saved-region snapshot.
///
/// Owned exclusively by one decode pass; each frame's canvas state derives
/// deterministically from the previous frame's declared disposal, never
/// from incidental buffer reuse.
pub struct Canvas {
    width: u16,
    height: u16,
    pixels: Vec<RGBA<u8>>,
    background: RGBA<u8>,
    pending: Option<Pending>,
}

impl Canvas {
    /// A canvas of the logical screen size, initially fully transparent.
    /// `background` is what `Background` disposal restores when the
    /// disposed frame declared no transparency.
    pub fn new(width: u16, height: u16, background: RGBA<u8>) -> Self {
        Self {
            width,
            height,
            pixels: vec![TRANSPARENT; width as usize * height as usize],
            background,
            pending: None,
        }
    }

    pub fn pixels(&self) -> &[RGBA<u8>] {
        &self.pixels
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Dispose of the previous frame's region, then composite `frame` at
    /// its declared offset using `palette`, skipping its transparent index.
    pub fn compose(&mut self, frame: &Frame, palette: &Palette) -> Result<(), DecodeError> {
        if frame.left as u32 + frame.width as u32 > self.width as u32
            || frame.top as u32 + frame.height as u32 > self.height as u32
        {
            return Err(DecodeError::FrameOutOfBounds);
        }
        if frame.indices.len() != frame.pixel_count() {
            return Err(DecodeError::TruncatedFrame {
                expected: frame.pixel_count(),
                got: frame.indices.len(),
            });
        }

        if let Some(pending) = self.pending.take() {
            self.dispose(pending);
        }

        // Snapshot only when this frame will need restoring later.
        let snapshot = (frame.disposal == DisposalMethod::Previous)
            .then(|| self.copy_region(frame.left, frame.top, frame.width, frame.height));

        let transparent = frame.transparent;
        for row in 0..frame.height as usize {
            let src = row * frame.width as usize;
            let dst = (frame.top as usize + row) * self.width as usize + frame.left as usize;
            for col in 0..frame.width as usize {
                let index = frame.indices[src + col];
                if Some(index) == transparent {
                    continue;
                }
                let [r, g, b] = palette.color(index);
                self.pixels[dst + col] = RGBA { r, g, b, a: 255 };
            }
        }

        self.pending = Some(Pending {
            left: frame.left,
            top: frame.top,
            width: frame.width,
            height: frame.height,
            disposal: frame.disposal,
            clear_color: if frame.transparent.is_some() {
                TRANSPARENT
            } else {
                self.background
            },
            snapshot,
        });
        Ok(())
    }

    fn dispose(&mut self, pending: Pending) {
        match pending.disposal {
            // `None` and `Keep` are behaviorally identical: the frame's
            // pixels stay as backdrop.
            DisposalMethod::None | DisposalMethod::Keep => {}
            DisposalMethod::Background => {
                self.fill_region(
                    pending.left,
                    pending.top,
                    pending.width,
                    pending.height,
                    pending.clear_color,
                );
            }
            DisposalMethod::Previous => {
                if let Some(snapshot) = pending.snapshot {
                    self.paste_region(
                        pending.left,
                        pending.top,
                        pending.width,
                        pending.height,
                        &snapshot,
                    );
                }
            }
        }
    }

    fn copy_region(&self, left: u16, top: u16, width: u16, height: u16) -> Vec<RGBA<u8>> {
        let mut out = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height as usize {
            let start = (top as usize + row) * self.width as usize + left as usize;
            out.extend_from_slice(&self.pixels[start..start + width as usize]);
        }
        out
    }

    fn paste_region(&mut self, left: u16, top: u16, width: u16, height: u16, data: &[RGBA<u8>]) {
        for row in 0..height as usize {
            let dst = (top as usize + row) * self.width as usize + left as usize;
            let src = row * width as usize;
            self.pixels[dst..dst + width as usize]
                .copy_from_slice(&data[src..src + width as usize]);
        }
    }

    fn fill_region(&mut self, left: u16, top: u16, width: u16, height: u16, color: RGBA<u8>) {
        for row in 0..height as usize {
            let dst = (top as usize + row) * self.width as usize + left as usize;
            self.pixels[dst..dst + width as usize].fill(color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba(r: u8, g: u8, b: u8) -> RGBA<u8> {
        RGBA { r, g, b, a: 255 }
    }

    fn one_pixel_frame(index: u8, disposal: DisposalMethod) -> Frame {
        let mut f = Frame::new(1, 1, vec![index]);
        f.disposal = disposal;
        f
    }

    #[test]
    fn background_disposal_clears_previous_region() {
        // The scenario: 2x2 canvas; frame 1 fills everything red with
        // Background disposal; frame 2 paints only the top-left pixel
        // green; frame 3 overwrites the same pixel blue.
        let palette = Palette::from_entries(
            vec![[255, 0, 0], [0, 255, 0], [0, 0, 255], [9, 9, 9]],
            None,
        );
        let background = rgba(9, 9, 9);
        let mut canvas = Canvas::new(2, 2, background);

        let mut frame1 = Frame::new(2, 2, vec![0, 0, 0, 0]);
        frame1.disposal = DisposalMethod::Background;
        canvas.compose(&frame1, &palette).unwrap();
        assert_eq!(canvas.pixels(), &[rgba(255, 0, 0); 4]);

        let frame2 = one_pixel_frame(1, DisposalMethod::None);
        canvas.compose(&frame2, &palette).unwrap();
        // Frame 1's region was cleared to background before frame 2 drew.
        assert_eq!(
            canvas.pixels(),
            &[rgba(0, 255, 0), background, background, background]
        );

        let frame3 = one_pixel_frame(2, DisposalMethod::None);
        canvas.compose(&frame3, &palette).unwrap();
        assert_eq!(
            canvas.pixels(),
            &[rgba(0, 0, 255), background, background, background]
        );
    }

    #[test]
    fn background_disposal_with_transparency_clears_to_transparent() {
        let palette = Palette::from_entries(vec![[255, 0, 0], [0, 255, 0]], None);
        let mut canvas = Canvas::new(1, 1, rgba(9, 9, 9));

        let mut frame1 = Frame::new(1, 1, vec![0]);
        frame1.disposal = DisposalMethod::Background;
        frame1.transparent = Some(1);
        canvas.compose(&frame1, &palette).unwrap();

        let mut frame2 = Frame::new(1, 1, vec![1]);
        frame2.transparent = Some(1);
        canvas.compose(&frame2, &palette).unwrap();
        assert_eq!(canvas.pixels()[0], TRANSPARENT);
    }

    #[test]
    fn previous_disposal_restores_snapshot() {
        let palette = Palette::from_entries(vec![[10, 0, 0], [0, 20, 0], [0, 0, 30]], None);
        let mut canvas = Canvas::new(1, 1, TRANSPARENT);

        canvas
            .compose(&one_pixel_frame(0, DisposalMethod::None), &palette)
            .unwrap();
        canvas
            .compose(&one_pixel_frame(1, DisposalMethod::Previous), &palette)
            .unwrap();
        assert_eq!(canvas.pixels()[0], rgba(0, 20, 0));

        // Frame 2 declared Previous: frame 3 sees frame 1's pixel restored
        // underneath, then draws over it.
        canvas
            .compose(&one_pixel_frame(2, DisposalMethod::None), &palette)
            .unwrap();
        assert_eq!(canvas.pixels()[0], rgba(0, 0, 30));
    }

    #[test]
    fn previous_disposal_visible_through_transparency() {
        let palette = Palette::from_entries(vec![[10, 0, 0], [0, 20, 0], [0, 0, 30]], None);
        let mut canvas = Canvas::new(1, 1, TRANSPARENT);

        canvas
            .compose(&one_pixel_frame(0, DisposalMethod::None), &palette)
            .unwrap();
        canvas
            .compose(&one_pixel_frame(1, DisposalMethod::Previous), &palette)
            .unwrap();

        // Frame 3's only pixel is transparent: after frame 2's region is
        // restored, frame 1's color shows through.
        let mut frame3 = one_pixel_frame(2, DisposalMethod::None);
        frame3.transparent = Some(2);
        canvas.compose(&frame3, &palette).unwrap();
        assert_eq!(canvas.pixels()[0], rgba(10, 0, 0));
    }

    #[test]
    fn transparent_index_leaves_canvas_unchanged() {
        let palette = Palette::from_entries(vec![[10, 0, 0], [0, 20, 0]], None);
        let mut canvas = Canvas::new(2, 1, TRANSPARENT);

        canvas
            .compose(&Frame::new(2, 1, vec![0, 0]), &palette)
            .unwrap();

        let mut frame2 = Frame::new(2, 1, vec![1, 1]);
        frame2.transparent = Some(1);
        canvas.compose(&frame2, &palette).unwrap();
        assert_eq!(canvas.pixels(), &[rgba(10, 0, 0), rgba(10, 0, 0)]);
    }

    #[test]
    fn keep_and_none_dispose_identically() {
        for disposal in [DisposalMethod::None, DisposalMethod::Keep] {
            let palette = Palette::from_entries(vec![[10, 0, 0], [0, 20, 0]], None);
            let mut canvas = Canvas::new(2, 1, rgba(9, 9, 9));

            let mut frame1 = Frame::new(2, 1, vec![0, 0]);
            frame1.disposal = disposal;
            canvas.compose(&frame1, &palette).unwrap();

            let frame2 = one_pixel_frame(1, DisposalMethod::None);
            canvas.compose(&frame2, &palette).unwrap();
            // The un-overwritten pixel survives from frame 1.
            assert_eq!(canvas.pixels()[1], rgba(10, 0, 0), "{disposal:?}");
        }
    }

    #[test]
    fn offset_frame_out_of_bounds() {
        let palette = Palette::from_entries(vec![[0, 0, 0]], None);
        let mut canvas = Canvas::new(2, 2, TRANSPARENT);
        let mut frame = Frame::new(2, 1, vec![0, 0]);
        frame.left = 1;
        assert!(matches!(
            canvas.compose(&frame, &palette),
            Err(DecodeError::FrameOutOfBounds)
        ));
    }
}
