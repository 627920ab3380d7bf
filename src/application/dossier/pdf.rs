//! PDF serialisation of a [`DossierLayout`].

use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};

use super::{RenderError, layout::DossierLayout};

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 18.0;
const VALUE_COLUMN_MM: f32 = 62.0;
const PT_TO_MM: f32 = 0.3528;
/// Average Helvetica glyph advance as a fraction of the font size.
const AVERAGE_GLYPH_EM: f32 = 0.5;

const TITLE_SIZE: f32 = 20.0;
const HEADING_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 12.0;

#[derive(Clone, Copy)]
enum Weight {
    Regular,
    Bold,
}

struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    cursor_mm: f32,
    pages: usize,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, RenderError> {
        let (doc, page, layer) = PdfDocument::new(
            title,
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            "page-1",
        );
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|err| RenderError::Pdf(err.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|err| RenderError::Pdf(err.to_string()))?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            cursor_mm: PAGE_HEIGHT_MM - MARGIN_MM,
            pages: 1,
        })
    }

    fn line_height(size: f32) -> f32 {
        size * PT_TO_MM * 1.4
    }

    fn ensure_room(&mut self, height: f32) {
        if self.cursor_mm - height >= MARGIN_MM {
            return;
        }
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            format!("page-{}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor_mm = PAGE_HEIGHT_MM - MARGIN_MM;
    }

    fn font(&self, weight: Weight) -> &IndirectFontRef {
        match weight {
            Weight::Regular => &self.regular,
            Weight::Bold => &self.bold,
        }
    }

    fn text_at(&self, text: &str, size: f32, weight: Weight, x_mm: f32) {
        self.layer
            .use_text(text, size, Mm(x_mm), Mm(self.cursor_mm), self.font(weight));
    }

    fn advance(&mut self, size: f32) {
        self.cursor_mm -= Self::line_height(size);
    }

    fn gap(&mut self, lines: f32) {
        self.cursor_mm -= Self::line_height(BODY_SIZE) * lines;
    }

    /// Write wrapped text starting at `x_mm`, breaking onto new pages as needed.
    fn paragraph(&mut self, text: &str, size: f32, weight: Weight, x_mm: f32) {
        for line in wrap(text, chars_per_line(size, PAGE_WIDTH_MM - MARGIN_MM - x_mm)) {
            self.ensure_room(Self::line_height(size));
            self.text_at(&line, size, weight, x_mm);
            self.advance(size);
        }
    }

    fn labelled(&mut self, label: &str, value: &str) {
        let lines = wrap(
            value,
            chars_per_line(BODY_SIZE, PAGE_WIDTH_MM - MARGIN_MM - VALUE_COLUMN_MM),
        );
        for (index, line) in lines.iter().enumerate() {
            self.ensure_room(Self::line_height(BODY_SIZE));
            if index == 0 {
                self.text_at(&format!("{label}:"), BODY_SIZE, Weight::Bold, MARGIN_MM);
            }
            self.text_at(line, BODY_SIZE, Weight::Regular, VALUE_COLUMN_MM);
            self.advance(BODY_SIZE);
        }
    }

    fn finish(self) -> Result<Vec<u8>, RenderError> {
        self.doc
            .save_to_bytes()
            .map_err(|err| RenderError::Pdf(err.to_string()))
    }
}

/// Serialise the layout into a standalone PDF document.
pub fn write_pdf(layout: &DossierLayout) -> Result<Vec<u8>, RenderError> {
    let mut writer = PageWriter::new(layout.title)?;

    let title_width = layout.title.chars().count() as f32 * TITLE_SIZE * PT_TO_MM * AVERAGE_GLYPH_EM;
    let title_x = ((PAGE_WIDTH_MM - title_width) / 2.0).max(MARGIN_MM);
    writer.paragraph(layout.title, TITLE_SIZE, Weight::Bold, title_x);
    writer.gap(1.0);

    for line in &layout.meta {
        writer.paragraph(line, BODY_SIZE, Weight::Regular, MARGIN_MM);
    }
    writer.gap(1.0);

    writer.paragraph(layout.fields_heading, HEADING_SIZE, Weight::Bold, MARGIN_MM);
    writer.gap(0.5);
    for field in &layout.fields {
        writer.labelled(field.label, &field.value);
    }

    for section in &layout.sections {
        writer.gap(1.0);
        writer.paragraph(section.heading, BODY_SIZE, Weight::Bold, MARGIN_MM);
        writer.gap(0.5);
        for paragraph in section.body.lines() {
            writer.paragraph(paragraph, BODY_SIZE, Weight::Regular, MARGIN_MM);
        }
    }

    writer.finish()
}

fn chars_per_line(size: f32, width_mm: f32) -> usize {
    let glyph_mm = size * PT_TO_MM * AVERAGE_GLYPH_EM;
    ((width_mm / glyph_mm) as usize).max(1)
}

/// Greedy word wrap; words longer than a line are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        let current_len = current.chars().count();
        if current_len > 0 && current_len + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
