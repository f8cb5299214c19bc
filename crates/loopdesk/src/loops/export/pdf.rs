//! Single-loop PDF report built directly with `lopdf`.
//!
//! Text pages use the standard Helvetica fonts, so only printable ASCII is
//! rendered; other characters become spaces. Images are decoded, downscaled
//! and embedded as raw RGB XObjects on a trailing page, two per row.

use chrono::{DateTime, Utc};
use image::GenericImageView;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::error::ExportError;
use crate::generator::format::format_currency;
use crate::loops::Loop;

const PAGE_WIDTH: f64 = 612.0;
const PAGE_HEIGHT: f64 = 792.0;
const LEFT_MARGIN: f64 = 50.0;
const TOP_Y: f64 = 742.0;
const BOTTOM_Y: f64 = 60.0;
const WRAP_COLUMNS: usize = 90;

/// Longest edge of an embedded image after downscaling.
const MAX_IMAGE_EDGE: u32 = 800;
const IMAGE_BOX_WIDTH: f64 = 240.0;
const IMAGE_BOX_HEIGHT: f64 = 180.0;
const IMAGES_PER_ROW: usize = 2;

/// Image bytes handed to the report.
#[derive(Debug, Clone)]
pub struct ReportImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

struct TextLine {
    font: Font,
    size: u32,
    text: String,
    /// Extra space above the line.
    gap: f64,
}

fn line(font: Font, size: u32, text: impl Into<String>, gap: f64) -> TextLine {
    TextLine {
        font,
        size,
        text: text.into(),
        gap,
    }
}

pub fn loop_report(record: &Loop, images: &[ReportImage]) -> Result<Vec<u8>, ExportError> {
    loop_report_at(record, images, Utc::now())
}

pub(crate) fn loop_report_at(
    record: &Loop,
    images: &[ReportImage],
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, ExportError> {
    let _span = tracing::info_span!("export.pdf", loop_id = record.id).entered();

    let lines = report_lines(record);
    let footer = format!(
        "Generated on {} - Real Estate Transaction Management System",
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let fonts = dictionary! {
        "F1" => regular_id,
        "F2" => bold_id,
    };
    let text_resources_id = doc.add_object(dictionary! {
        "Font" => fonts.clone(),
    });

    let mut page_ids = Vec::new();
    for chunk in paginate(&lines) {
        let content = text_page_content(chunk, &footer);
        let page_id = add_page(&mut doc, pages_id, text_resources_id, content);
        page_ids.push(page_id);
    }

    let decoded = decode_images(images);
    if !decoded.is_empty() {
        let mut xobjects = lopdf::Dictionary::new();
        let mut content = String::new();
        content.push_str(&format!(
            "BT\n/F2 14 Tf\n{} {} Td\n(Property Images) Tj\nET\n",
            LEFT_MARGIN, TOP_Y
        ));

        for (i, image) in decoded.iter().enumerate() {
            let name = format!("Im{}", i + 1);
            let image_id = doc.add_object(Object::Stream(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => image.width as i64,
                    "Height" => image.height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                },
                image.rgb.clone(),
            )));
            xobjects.set(name.as_bytes().to_vec(), image_id);

            let col = i % IMAGES_PER_ROW;
            let row = i / IMAGES_PER_ROW;
            let box_x = LEFT_MARGIN + col as f64 * (IMAGE_BOX_WIDTH + 20.0);
            let box_top = TOP_Y - 30.0 - row as f64 * (IMAGE_BOX_HEIGHT + 36.0);

            let scale = (IMAGE_BOX_WIDTH / image.width as f64)
                .min(IMAGE_BOX_HEIGHT / image.height as f64);
            let w = image.width as f64 * scale;
            let h = image.height as f64 * scale;
            let y = box_top - h;

            content.push_str(&format!(
                "q\n{:.2} 0 0 {:.2} {:.2} {:.2} cm\n/{} Do\nQ\n",
                w, h, box_x, y, name
            ));
            content.push_str(&format!(
                "BT\n/F1 8 Tf\n{:.2} {:.2} Td\n({}) Tj\nET\n",
                box_x,
                box_top - IMAGE_BOX_HEIGHT - 12.0,
                escape_pdf_string(&image.caption)
            ));
        }
        content.push_str(&footer_content(&footer));

        let resources_id = doc.add_object(dictionary! {
            "Font" => fonts,
            "XObject" => xobjects,
        });
        let page_id = add_page(&mut doc, pages_id, resources_id, content);
        page_ids.push(page_id);
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| (*id).into()).collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ExportError::Pdf(e.to_string()))?;
    Ok(buffer)
}

fn add_page(doc: &mut Document, pages_id: ObjectId, resources_id: ObjectId, content: String) -> ObjectId {
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), (PAGE_WIDTH as i64).into(), (PAGE_HEIGHT as i64).into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    })
}

fn or_na(value: Option<&str>) -> String {
    value
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "N/A".to_string())
}

fn report_lines(record: &Loop) -> Vec<TextLine> {
    let mut lines = vec![
        line(Font::Bold, 20, "Real Estate Transaction Loop", 0.0),
        line(
            Font::Bold,
            16,
            format!("Loop #{}    Status: {}", record.id, record.status.as_str().to_uppercase()),
            14.0,
        ),
    ];

    let mut section = |title: &str, rows: Vec<(&str, String)>| {
        lines.push(line(Font::Bold, 14, title, 16.0));
        for (label, value) in rows {
            let mut first = true;
            for wrapped in wrap(&value, WRAP_COLUMNS - label.len() - 1) {
                let text = if first {
                    format!("{} {}", label, wrapped)
                } else {
                    format!("{} {}", " ".repeat(label.len()), wrapped)
                };
                lines.push(line(Font::Regular, 10, text, 2.0));
                first = false;
            }
        }
    };

    section(
        "Property Information",
        vec![
            ("Type:", or_na(Some(&record.loop_type))),
            ("Address:", or_na(Some(&record.property_address))),
            (
                "Sale Amount:",
                match record.sale {
                    Some(s) if s != 0.0 => format_currency(Some(s)),
                    _ => "N/A".to_string(),
                },
            ),
        ],
    );
    section(
        "Client Information",
        vec![
            ("Name:", or_na(record.client_name.as_deref())),
            ("Email:", or_na(record.client_email.as_deref())),
            ("Phone:", or_na(record.client_phone.as_deref())),
        ],
    );
    section(
        "Timeline",
        vec![
            (
                "Start Date:",
                record
                    .start_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "N/A".to_string()),
            ),
            (
                "End Date:",
                record
                    .end_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "N/A".to_string()),
            ),
            ("Created:", record.created_at.format("%Y-%m-%d").to_string()),
            ("Last Updated:", record.updated_at.format("%Y-%m-%d").to_string()),
            ("Creator:", or_na(record.creator_name.as_deref())),
        ],
    );

    if let Some(tags) = record.tags.as_deref().filter(|t| !t.is_empty()) {
        section("Tags", vec![("", tags.to_string())]);
    }
    if let Some(notes) = record.notes.as_deref().filter(|n| !n.is_empty()) {
        section("Notes", vec![("", notes.to_string())]);
    }

    lines
}

/// Greedy word wrap on whitespace; explicit newlines are kept.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(20);
    let mut out = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if !current.is_empty() && current.len() + 1 + word.len() > width {
                out.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        out.push(current);
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}

fn line_height(l: &TextLine) -> f64 {
    l.size as f64 * 1.4 + l.gap
}

fn paginate(lines: &[TextLine]) -> Vec<&[TextLine]> {
    let mut pages = Vec::new();
    let mut start = 0;
    let mut used = 0.0;
    for (i, l) in lines.iter().enumerate() {
        let h = line_height(l);
        if used + h > TOP_Y - BOTTOM_Y && i > start {
            pages.push(&lines[start..i]);
            start = i;
            used = 0.0;
        }
        used += h;
    }
    pages.push(&lines[start..]);
    pages
}

fn text_page_content(lines: &[TextLine], footer: &str) -> String {
    let mut content = String::new();
    let mut y = TOP_Y;
    for (i, l) in lines.iter().enumerate() {
        if i > 0 {
            y -= line_height(l);
        }
        content.push_str(&format!(
            "BT\n/{} {} Tf\n{} {:.2} Td\n({}) Tj\nET\n",
            l.font.resource(),
            l.size,
            LEFT_MARGIN,
            y,
            escape_pdf_string(&l.text)
        ));
    }
    content.push_str(&footer_content(footer));
    content
}

fn footer_content(footer: &str) -> String {
    format!(
        "BT\n/F1 8 Tf\n{} 30 Td\n({}) Tj\nET\n",
        LEFT_MARGIN,
        escape_pdf_string(footer)
    )
}

struct DecodedImage {
    caption: String,
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

fn decode_images(images: &[ReportImage]) -> Vec<DecodedImage> {
    images
        .iter()
        .filter_map(|image| match decode_image(image) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                log::warn!("Skipping image in PDF report: {}", e);
                None
            }
        })
        .collect()
}

fn decode_image(image: &ReportImage) -> Result<DecodedImage, ExportError> {
    let img = image::load_from_memory(&image.bytes).map_err(|e| ExportError::Image {
        name: image.name.clone(),
        reason: e.to_string(),
    })?;

    let (w, h) = img.dimensions();
    let img = if w > MAX_IMAGE_EDGE || h > MAX_IMAGE_EDGE {
        img.thumbnail(MAX_IMAGE_EDGE, MAX_IMAGE_EDGE)
    } else {
        img
    };
    let (width, height) = img.dimensions();

    Ok(DecodedImage {
        caption: image.name.clone(),
        width,
        height,
        rgb: img.to_rgb8().into_raw(),
    })
}

fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            c if c.is_ascii() && !c.is_control() => c.to_string(),
            _ => " ".to_string(),
        })
        .collect()
}
