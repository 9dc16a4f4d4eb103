//! Thread layout: flows post text and image rows across fixed-size pages.
//!
//! # Rules
//! - A text block is never split: if the wrapped block does not fit below the
//!   cursor, a new page starts before its first line.
//! - Images flow left to right at half the content width (aspect ratio kept,
//!   height capped). A row wraps when the next image would cross the right
//!   margin; a page breaks when it would cross the bottom margin.
//! - A gray separator follows every post except the last.
//!
//! Single pass, no backtracking. The backend is saved exactly once, and only if
//! every draw call succeeded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::layout::backend::{BackendError, DrawingBackend, ImageFormat, PageSize, Rect};
use crate::layout::filename::derive_filename;
use crate::layout::font_metrics::PageConfig;
use crate::models::{ExportResult, Post, ThreadImage};

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("thread has no posts")]
    EmptyThread,

    #[error("drawing failed: {0}")]
    Backend(#[from] BackendError),
}

/// What a successful layout produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSummary {
    pub filename: String,
    pub page_count: usize,
}

/// Mutable placement state for one layout pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutCursor {
    pub page_index: usize,
    pub y: f32,
    pub x: f32,
    pub row_max_height: f32,
}

impl LayoutCursor {
    fn at_top(margin: f32) -> Self {
        Self {
            page_index: 0,
            y: margin,
            x: margin,
            row_max_height: 0.0,
        }
    }
}

/// Lays out `posts`, saves the document and converts the outcome into a result descriptor.
pub fn layout<B: DrawingBackend + ?Sized>(
    posts: &[Post],
    backend: &mut B,
    config: &PageConfig,
) -> ExportResult {
    match render_thread(posts, backend, config, Utc::now()) {
        Ok(summary) => {
            info!(
                filename = %summary.filename,
                pages = summary.page_count,
                "Document generated and saved"
            );
            ExportResult::saved(summary.filename)
        }
        Err(e) => {
            error!("Error generating document: {e}");
            ExportResult::failed(e)
        }
    }
}

/// Runs the layout pass. `now` feeds the fallback file name.
pub fn render_thread<B: DrawingBackend + ?Sized>(
    posts: &[Post],
    backend: &mut B,
    config: &PageConfig,
    now: DateTime<Utc>,
) -> Result<LayoutSummary, LayoutError> {
    let first = posts.first().ok_or(LayoutError::EmptyThread)?;
    let filename = derive_filename(first.printable_text(), now);

    let page = backend.page_size();
    let mut engine = LayoutPass {
        backend,
        config,
        page,
        cursor: LayoutCursor::at_top(config.margin_mm),
    };

    for (index, post) in posts.iter().enumerate() {
        if let Some(text) = post.printable_text() {
            engine.place_text(text)?;
        }
        if !post.images.is_empty() {
            engine.place_images(&post.images)?;
        }
        if index + 1 < posts.len() {
            engine.place_separator()?;
        }
    }

    let filename = engine.backend.save(&filename)?;

    Ok(LayoutSummary {
        filename,
        page_count: engine.cursor.page_index + 1,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Layout pass
// ────────────────────────────────────────────────────────────────────────────

struct LayoutPass<'a, B: DrawingBackend + ?Sized> {
    backend: &'a mut B,
    config: &'a PageConfig,
    page: PageSize,
    cursor: LayoutCursor,
}

impl<B: DrawingBackend + ?Sized> LayoutPass<'_, B> {
    fn margin(&self) -> f32 {
        self.config.margin_mm
    }

    fn bottom_limit(&self) -> f32 {
        self.page.height - self.margin()
    }

    fn content_width(&self) -> f32 {
        self.page.width - 2.0 * self.margin()
    }

    fn new_page(&mut self) {
        self.backend.add_page();
        self.cursor.page_index += 1;
        self.cursor.y = self.margin();
        self.cursor.x = self.margin();
        self.cursor.row_max_height = 0.0;
        debug!(page = self.cursor.page_index, "Page break");
    }

    fn place_text(&mut self, text: &str) -> Result<(), LayoutError> {
        let lines = self.backend.split_text_to_size(text, self.content_width());
        let block_height = lines.len() as f32 * self.config.line_height_mm;

        if self.cursor.y + block_height > self.bottom_limit() {
            // A block already at the top of a page stays there even if it overflows.
            if self.cursor.y > self.margin() {
                self.new_page();
            }
            if self.cursor.y + block_height > self.bottom_limit() {
                warn!(
                    lines = lines.len(),
                    "Text block is taller than a page and will overflow the bottom margin"
                );
            }
        }

        self.backend.text(&lines, self.margin(), self.cursor.y)?;
        self.cursor.y += block_height + self.config.block_spacing_mm;
        Ok(())
    }

    fn place_images(&mut self, images: &[ThreadImage]) -> Result<(), LayoutError> {
        let spacing = self.config.image_spacing_mm;
        let right_limit = self.page.width - self.margin();
        self.cursor.x = self.margin();
        self.cursor.row_max_height = 0.0;

        for image in images {
            let (width, height) = self.image_size(image);

            if self.cursor.x + width > right_limit {
                self.cursor.y += self.cursor.row_max_height + spacing;
                self.cursor.x = self.margin();
                self.cursor.row_max_height = 0.0;
            }

            if self.cursor.y + height > self.bottom_limit() {
                self.new_page();
            }

            let rect = Rect {
                x: self.cursor.x,
                y: self.cursor.y,
                width,
                height,
            };
            let format = ImageFormat::from_src(&image.src);
            self.backend.add_image(&image.src, format, rect)?;
            self.cursor.x += width + spacing;
            self.cursor.row_max_height = self.cursor.row_max_height.max(height);
        }

        self.cursor.y += self.cursor.row_max_height + spacing;
        self.cursor.x = self.margin();
        self.cursor.row_max_height = 0.0;
        Ok(())
    }

    /// Half the content width at the image's aspect ratio, height capped.
    fn image_size(&self, image: &ThreadImage) -> (f32, f32) {
        let ratio = image.aspect_ratio();
        let mut width = self.content_width() / 2.0;
        let mut height = width / ratio;
        if height > self.config.max_image_height_mm {
            height = self.config.max_image_height_mm;
            width = height * ratio;
        }
        (width, height)
    }

    fn place_separator(&mut self) -> Result<(), LayoutError> {
        if self.cursor.y > self.page.height - self.config.separator_clearance_mm {
            self.new_page();
        }
        self.backend.set_draw_gray(self.config.separator_gray);
        self.backend.line(
            self.margin(),
            self.cursor.y,
            self.page.width - self.margin(),
            self.cursor.y,
        )?;
        self.cursor.y += self.config.separator_gap_mm;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::font_metrics::default_page_config;
    use crate::layout::recording::{DrawOp, RecordingBackend};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn text_post(text: &str) -> Post {
        Post {
            text: Some(text.to_string()),
            images: vec![],
        }
    }

    fn image(src: &str, width: u32, height: u32) -> ThreadImage {
        ThreadImage {
            src: src.to_string(),
            width,
            height,
        }
    }

    fn run(posts: &[Post]) -> (RecordingBackend, LayoutSummary) {
        let mut backend = RecordingBackend::new(default_page_config());
        let summary = render_thread(posts, &mut backend, &default_page_config(), now()).unwrap();
        (backend, summary)
    }

    fn images(ops: &[DrawOp]) -> Vec<(usize, Rect)> {
        ops.iter()
            .filter_map(|op| match op {
                DrawOp::Image { page, rect, .. } => Some((*page, *rect)),
                _ => None,
            })
            .collect()
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    /// A post whose text wraps to exactly `lines` lines.
    fn post_with_lines(lines: usize) -> Post {
        text_post(&vec!["line"; lines].join("\n"))
    }

    #[test]
    fn test_end_to_end_a4_short_thread() {
        let posts = vec![
            text_post("Short post"),
            Post {
                text: Some(String::new()),
                images: vec![image("https://img/1.jpg", 512, 256)],
            },
        ];
        let (backend, summary) = run(&posts);

        assert_eq!(summary.page_count, 1);
        assert_eq!(summary.filename, "short_post.pdf");
        let ops = backend.ops();
        assert!(!ops.iter().any(|op| matches!(op, DrawOp::AddPage)));

        match &ops[0] {
            DrawOp::Text { page, lines, x, y } => {
                assert_eq!(*page, 0);
                assert_eq!(lines, &vec!["Short post".to_string()]);
                assert!(close(*x, 10.0) && close(*y, 10.0));
            }
            other => panic!("expected text first, got {other:?}"),
        }

        // text: 10 + 5 + 5 = 20; separator at 20, then 25
        assert!(matches!(ops[1], DrawOp::Line { y1, gray: 200, .. } if close(y1, 20.0)));

        let placed = images(ops);
        assert_eq!(placed.len(), 1);
        let (page, rect) = placed[0];
        assert_eq!(page, 0);
        assert!(close(rect.x, 10.0) && close(rect.y, 25.0));
        assert!(close(rect.width, 95.0), "width {}", rect.width);
        assert!(close(rect.height, 47.5), "height {}", rect.height);
        assert_eq!(backend.saved_filenames(), vec!["short_post.pdf"]);
    }

    #[test]
    fn test_image_format_follows_source() {
        let post = Post {
            text: None,
            images: vec![
                image("https://pbs.example/media/a?format=png&name=small", 10, 10),
                image("https://pbs.example/media/b.jpg", 10, 10),
            ],
        };
        let (backend, _) = run(&[post]);
        let formats: Vec<ImageFormat> = backend
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Image { format, .. } => Some(*format),
                _ => None,
            })
            .collect();
        assert_eq!(formats, vec![ImageFormat::Png, ImageFormat::Jpeg]);
    }

    #[test]
    fn test_text_block_that_does_not_fit_starts_new_page() {
        // 50 lines = 250mm + 5mm spacing: y goes 10 -> 265, separator at 265 -> 270.
        // 10 more lines need 50mm: 270 + 50 > 287, so the block moves to page 1.
        let posts = vec![post_with_lines(50), post_with_lines(10)];
        let (backend, summary) = run(&posts);

        assert_eq!(summary.page_count, 2);
        let texts: Vec<_> = backend
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { page, lines, y, .. } => Some((*page, lines.len(), *y)),
                _ => None,
            })
            .collect();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[1].0, 1);
        assert!(close(texts[1].2, 10.0));

        let config = default_page_config();
        for (_, count, y) in texts {
            let bottom = y + count as f32 * config.line_height_mm;
            assert!(bottom <= config.page_height_mm - config.margin_mm + 1e-3);
        }
    }

    #[test]
    fn test_block_that_fits_exactly_stays_on_page() {
        // 55 lines * 5mm = 275mm; 10 + 275 = 285 <= 287
        let (backend, summary) = run(&[post_with_lines(55)]);
        assert_eq!(summary.page_count, 1);
        assert!(!backend.ops().iter().any(|op| matches!(op, DrawOp::AddPage)));
    }

    #[test]
    fn test_oversized_block_does_not_emit_blank_page() {
        let (backend, summary) = run(&[post_with_lines(80)]);
        assert_eq!(summary.page_count, 1);
        assert!(matches!(backend.ops()[0], DrawOp::Text { page: 0, .. }));
    }

    #[test]
    fn test_images_wrap_when_row_overflows() {
        // Square images: 95mm wide would be 95mm tall, capped to 50x50.
        // 10 + 50 + 5 = 65, 65 + 50 + 5 = 120, third at 120 + 50 = 170 <= 200.
        // Fourth: 175 + 50 > 200, wraps.
        let post = Post {
            text: None,
            images: (0..4).map(|i| image(&format!("s{i}"), 100, 100)).collect(),
        };
        let (backend, _) = run(&[post]);
        let placed = images(backend.ops());

        assert_eq!(placed.len(), 4);
        for (_, rect) in &placed {
            assert!(close(rect.width, 50.0) && close(rect.height, 50.0));
            assert!(rect.x + rect.width <= 200.0 + 1e-3, "overflows right margin: {rect:?}");
        }
        assert!(close(placed[0].1.x, 10.0));
        assert!(close(placed[1].1.x, 65.0));
        assert!(close(placed[2].1.x, 120.0));
        assert!(close(placed[3].1.x, 10.0));
        // Row advance is the tallest image in the row plus spacing.
        assert!(close(placed[3].1.y, 10.0 + 50.0 + 5.0));
    }

    #[test]
    fn test_row_height_is_tallest_image_in_row() {
        // 95 x 47.5 (2:1) then a square capped to 50 x 50 that does not fit beside it.
        let post = Post {
            text: None,
            images: vec![
                image("wide", 200, 100),
                image("tall", 40, 100),
                image("sq", 10, 10),
                image("wide2", 200, 100),
            ],
        };
        let (backend, _) = run(&[post]);
        let placed = images(backend.ops());

        // wide: x=10, w=95. tall: h=50, w=20; 110 + 20 <= 200 -> same row.
        assert!(close(placed[1].1.x, 110.0) && close(placed[1].1.y, 10.0));
        // sq: 50x50 at x=135; 135 + 50 = 185 <= 200 -> same row.
        assert!(close(placed[2].1.x, 135.0) && close(placed[2].1.y, 10.0));
        // wide2 wraps; the row advance uses the 50mm images, not the 47.5mm one.
        assert!(close(placed[3].1.x, 10.0) && close(placed[3].1.y, 65.0));
    }

    #[test]
    fn test_image_that_overflows_page_starts_new_page() {
        let posts = vec![
            post_with_lines(48),
            Post {
                text: None,
                images: vec![image("late", 100, 100)],
            },
        ];
        let (backend, summary) = run(&posts);
        // 48 lines: y = 10 + 240 + 5 = 255; separator -> 260; 260 + 50 > 287.
        assert_eq!(summary.page_count, 2);
        let placed = images(backend.ops());
        assert_eq!(placed[0].0, 1);
        assert!(close(placed[0].1.x, 10.0) && close(placed[0].1.y, 10.0));
    }

    #[test]
    fn test_separator_near_bottom_moves_to_next_page() {
        // 54 lines: y = 10 + 270 + 5 = 285 > 297 - 20.
        let (backend, summary) = run(&[post_with_lines(54), text_post("next")]);
        assert_eq!(summary.page_count, 2);
        let line = backend
            .ops()
            .iter()
            .find(|op| matches!(op, DrawOp::Line { .. }))
            .unwrap();
        assert!(matches!(line, DrawOp::Line { page: 1, y1, .. } if close(*y1, 10.0)));
    }

    #[test]
    fn test_no_separator_after_last_post() {
        let (backend, _) = run(&[text_post("a"), text_post("b"), text_post("c")]);
        let lines = backend
            .ops()
            .iter()
            .filter(|op| matches!(op, DrawOp::Line { .. }))
            .count();
        assert_eq!(lines, 2);
    }

    #[test]
    fn test_text_only_post_adds_only_text_extent() {
        // Two text posts: second text must sit right after first block + separator.
        let (backend, _) = run(&[text_post("first"), text_post("second")]);
        let ys: Vec<f32> = backend
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { y, .. } => Some(*y),
                _ => None,
            })
            .collect();
        // 10 + 5 (1 line) + 5 (spacing) = 20, separator + 5 = 25
        assert!(close(ys[1], 25.0), "second block at {}", ys[1]);
    }

    #[test]
    fn test_saves_exactly_once() {
        let posts: Vec<Post> = (0..30).map(|i| post_with_lines(i % 7 + 1)).collect();
        let (backend, _) = run(&posts);
        assert_eq!(backend.saved_filenames().len(), 1);
        assert!(matches!(backend.ops().last(), Some(DrawOp::Save { .. })));
    }

    #[test]
    fn test_empty_thread_is_an_error() {
        let mut backend = RecordingBackend::new(default_page_config());
        let err = render_thread(&[], &mut backend, &default_page_config(), now()).unwrap_err();
        assert!(matches!(err, LayoutError::EmptyThread));
        assert!(backend.saved_filenames().is_empty());
    }

    #[test]
    fn test_first_post_without_text_uses_timestamp_name() {
        let posts = vec![Post {
            text: None,
            images: vec![image("a", 10, 10)],
        }];
        let (_, summary) = run(&posts);
        assert_eq!(summary.filename, "thread_20240102_030405.pdf");
    }

    /// Fails every image placement, records whether save was attempted.
    struct BrokenImages {
        inner: RecordingBackend,
    }

    impl DrawingBackend for BrokenImages {
        fn page_size(&self) -> PageSize {
            self.inner.page_size()
        }
        fn split_text_to_size(&self, text: &str, max_width: f32) -> Vec<String> {
            self.inner.split_text_to_size(text, max_width)
        }
        fn text(&mut self, lines: &[String], x: f32, y: f32) -> Result<(), BackendError> {
            self.inner.text(lines, x, y)
        }
        fn add_image(&mut self, src: &str, _: ImageFormat, _: Rect) -> Result<(), BackendError> {
            Err(BackendError::ImageDecode {
                src: src.to_string(),
                message: "corrupt".to_string(),
            })
        }
        fn set_draw_gray(&mut self, level: u8) {
            self.inner.set_draw_gray(level)
        }
        fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<(), BackendError> {
            self.inner.line(x1, y1, x2, y2)
        }
        fn add_page(&mut self) {
            self.inner.add_page()
        }
        fn save(&mut self, filename: &str) -> Result<String, BackendError> {
            self.inner.save(filename)
        }
    }

    #[test]
    fn test_backend_failure_aborts_without_saving() {
        let mut backend = BrokenImages {
            inner: RecordingBackend::new(default_page_config()),
        };
        let posts = vec![
            text_post("has an image"),
            Post {
                text: None,
                images: vec![image("bad.jpg", 10, 10)],
            },
        ];
        let result = layout(&posts, &mut backend, &default_page_config());

        assert!(!result.success);
        assert!(result.error.unwrap().contains("bad.jpg"));
        assert!(backend.inner.saved_filenames().is_empty());
    }

    #[test]
    fn test_layout_success_result_carries_filename() {
        let mut backend = RecordingBackend::new(default_page_config());
        let result = layout(
            &[text_post("Hello, World! 2024 #test")],
            &mut backend,
            &default_page_config(),
        );
        assert_eq!(result, ExportResult::saved("hello__world__2024__test.pdf"));
    }
}
