//! Positioned text extraction.
//!
//! Interprets a page's content stream far enough to know where every shown
//! string lands, then groups strings sharing a baseline into line blocks.
//! Form XObjects drawn with `Do` are interpreted in place, under their own
//! `/Matrix` and `/Resources`.
//! Block coordinates use a top-left origin: `y0` is the distance from the
//! top of the MediaBox to the top of the block, `y1` to its bottom.
//!
//! A block is one line, not a paragraph: stacked label lines stay separate
//! blocks, so the anchor is the matching line itself rather than the top of
//! the paragraph around it.

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::PdfError;
use crate::pdf::cmap::ToUnicode;
use crate::pdf::{inherited, media_box, name, number, resolve, stream_bytes, PageBox};

const ASCENT: f64 = 0.8;
const DESCENT: f64 = 0.2;
const MISSING_WIDTH: f64 = 500.0;
const MONOSPACE_WIDTH: f64 = 600.0;
const CID_DEFAULT_WIDTH: f64 = 1000.0;

// Line grouping thresholds, in multiples of the font size
const BASELINE_TOLERANCE: f64 = 0.5;
const SPACE_GAP: f64 = 0.15;
const BLOCK_GAP: f64 = 1.5;
const BACKTRACK: f64 = 0.5;

const MAX_FORM_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct PageText {
    pub page_box: PageBox,
    pub blocks: Vec<TextBlock>,
}

pub fn extract_page_text(doc: &Document, page_id: ObjectId) -> Result<PageText, PdfError> {
    let page_box = media_box(doc, page_id)?;

    let page = doc.get_object(page_id)?.as_dict()?;
    if !page.has(b"Contents") {
        return Ok(PageText {
            page_box,
            blocks: Vec::new(),
        });
    }

    let resources = page_resources(doc, page_id)?;
    let content = doc
        .get_and_decode_page_content(page_id)
        .map_err(|e| PdfError::Content(e.to_string()))?;

    let mut interpreter = Interpreter::new(doc, Rc::new(resources));
    for operation in &content.operations {
        interpreter.apply(&operation.operator, &operation.operands);
    }

    Ok(PageText {
        page_box,
        blocks: interpreter.finish(page_box.top),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translate(tx: f64, ty: f64) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Matrix::IDENTITY
        }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        let v: Vec<f64> = operands.iter().map(number).collect::<Option<_>>()?;
        match v.as_slice() {
            [a, b, c, d, e, f] => Some(Matrix {
                a: *a,
                b: *b,
                c: *c,
                d: *d,
                e: *e,
                f: *f,
            }),
            _ => None,
        }
    }

    /// `self` applied first, then `other`.
    fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    fn vertical_scale(&self) -> f64 {
        self.c.hypot(self.d)
    }
}

#[derive(Debug, Clone)]
struct Font {
    code_len: usize,
    first_char: u32,
    widths: Vec<f64>,
    cid_widths: HashMap<u32, f64>,
    default_width: f64,
    to_unicode: Option<ToUnicode>,
}

impl Font {
    fn fallback() -> Self {
        Font {
            code_len: 1,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: MISSING_WIDTH,
            to_unicode: None,
        }
    }

    fn from_dict(doc: &Document, dict: &Dictionary) -> Self {
        let to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|o| resolve(doc, o).ok())
            .and_then(|o| o.as_stream().ok())
            .and_then(|s| stream_bytes(s).ok())
            .map(|bytes| ToUnicode::parse(&bytes));

        let subtype = dict.get(b"Subtype").ok().and_then(name);
        if subtype == Some(b"Type0".as_slice()) {
            let descendant = dict
                .get(b"DescendantFonts")
                .ok()
                .and_then(|o| resolve(doc, o).ok())
                .and_then(|o| o.as_array().ok())
                .and_then(|fonts| fonts.first())
                .and_then(|o| resolve(doc, o).ok())
                .and_then(|o| o.as_dict().ok());

            let default_width = descendant
                .and_then(|d| d.get(b"DW").ok())
                .and_then(number)
                .unwrap_or(CID_DEFAULT_WIDTH);
            let cid_widths = descendant
                .and_then(|d| d.get(b"W").ok())
                .and_then(|o| resolve(doc, o).ok())
                .and_then(|o| o.as_array().ok())
                .map(|w| cid_widths(doc, w))
                .unwrap_or_default();

            return Font {
                code_len: 2,
                first_char: 0,
                widths: Vec::new(),
                cid_widths,
                default_width,
                to_unicode,
            };
        }

        let first_char = dict
            .get(b"FirstChar")
            .ok()
            .and_then(number)
            .map(|n| n.max(0.0) as u32)
            .unwrap_or(0);
        let widths = dict
            .get(b"Widths")
            .ok()
            .and_then(|o| resolve(doc, o).ok())
            .and_then(|o| o.as_array().ok())
            .map(|items| {
                items
                    .iter()
                    .map(|w| resolve(doc, w).ok().and_then(number).unwrap_or(0.0))
                    .collect()
            })
            .unwrap_or_default();

        let monospace = dict
            .get(b"BaseFont")
            .ok()
            .and_then(name)
            .map(|n| String::from_utf8_lossy(n).contains("Courier"))
            .unwrap_or(false);
        let default_width = dict
            .get(b"FontDescriptor")
            .ok()
            .and_then(|o| resolve(doc, o).ok())
            .and_then(|o| o.as_dict().ok())
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(number)
            .filter(|w| *w > 0.0)
            .unwrap_or(if monospace { MONOSPACE_WIDTH } else { MISSING_WIDTH });

        Font {
            code_len: 1,
            first_char,
            widths,
            cid_widths: HashMap::new(),
            default_width,
            to_unicode,
        }
    }

    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks(self.code_len)
            .map(|chunk| chunk.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
            .collect()
    }

    /// Glyph advance in thousandths of an em.
    fn width(&self, code: u32) -> f64 {
        if self.code_len > 1 {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .unwrap_or(self.default_width);
        }
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.default_width)
    }

    fn decode(&self, code: u32, out: &mut String) {
        if let Some(text) = self.to_unicode.as_ref().and_then(|m| m.get(code)) {
            out.push_str(text);
            return;
        }
        let ch = if self.code_len == 1 {
            // Latin-1 is close enough to WinAnsi/Standard for keyword matching
            u8::try_from(code).ok().map(char::from)
        } else {
            char::from_u32(code)
        };
        if let Some(ch) = ch.filter(|c| !c.is_control()) {
            out.push(ch);
        }
    }
}

fn cid_widths(doc: &Document, w: &[Object]) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < w.len() {
        let Some(first) = number(&w[i]).map(|n| n as u32) else {
            break;
        };
        match w.get(i + 1).and_then(|o| resolve(doc, o).ok()) {
            Some(Object::Array(list)) => {
                for (offset, width) in list.iter().enumerate() {
                    if let Some(width) = number(width) {
                        widths.insert(first + offset as u32, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) =
                    (number(last), w.get(i + 2).and_then(number))
                else {
                    break;
                };
                let last = last as u32;
                for cid in first..=last.min(first.saturating_add(0xFFFF)) {
                    widths.insert(cid, width);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

/// Fonts and XObjects reachable from one resource dictionary.
#[derive(Default)]
struct Resources {
    fonts: HashMap<Vec<u8>, Font>,
    xobjects: HashMap<Vec<u8>, ObjectId>,
}

impl Resources {
    fn from_dict(doc: &Document, resources: &Dictionary) -> Self {
        let mut fonts = HashMap::new();
        let font_dict = resources
            .get(b"Font")
            .ok()
            .and_then(|o| resolve(doc, o).ok())
            .and_then(|o| o.as_dict().ok());
        for (font_name, value) in font_dict.into_iter().flat_map(|d| d.iter()) {
            let font = match resolve(doc, value).ok().and_then(|o| o.as_dict().ok()) {
                Some(dict) => Font::from_dict(doc, dict),
                None => {
                    debug!(
                        "Font /{} is not a dictionary, using default metrics",
                        String::from_utf8_lossy(font_name)
                    );
                    Font::fallback()
                }
            };
            fonts.insert(font_name.clone(), font);
        }

        // XObject streams are always indirect
        let xobjects = resources
            .get(b"XObject")
            .ok()
            .and_then(|o| resolve(doc, o).ok())
            .and_then(|o| o.as_dict().ok())
            .map(|dict| {
                dict.iter()
                    .filter_map(|(name, value)| match value {
                        Object::Reference(id) => Some((name.clone(), *id)),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { fonts, xobjects }
    }
}

fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Resources, PdfError> {
    let Some(resources) = inherited(doc, page_id, b"Resources")? else {
        return Ok(Resources::default());
    };
    Ok(Resources::from_dict(doc, resolve(doc, resources)?.as_dict()?))
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Vec<u8>>,
    size: f64,
    char_spacing: f64,
    word_spacing: f64,
    h_scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Line {
    baseline: f64,
    x0: f64,
    x1: f64,
    size: f64,
    text: String,
}

struct Interpreter<'d> {
    doc: &'d Document,
    resources: Rc<Resources>,
    /// Form XObjects currently being interpreted, outermost first.
    forms: Vec<ObjectId>,
    fallback: Font,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    lines: Vec<Line>,
    current: Option<Line>,
}

impl<'d> Interpreter<'d> {
    fn new(doc: &'d Document, resources: Rc<Resources>) -> Self {
        Self {
            doc,
            resources,
            forms: Vec::new(),
            fallback: Font::fallback(),
            state: GraphicsState::default(),
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            lines: Vec::new(),
            current: None,
        }
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        let num = |i: usize| operands.get(i).and_then(number);

        match operator {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.state = saved;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.state.ctm = m.multiply(&self.state.ctm);
                }
            }
            "BT" => {
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(font) = operands.first().and_then(name) {
                    self.state.font = Some(font.to_vec());
                }
                if let Some(size) = num(1) {
                    self.state.size = size;
                }
            }
            "Tc" => self.state.char_spacing = num(0).unwrap_or(0.0),
            "Tw" => self.state.word_spacing = num(0).unwrap_or(0.0),
            "Tz" => self.state.h_scale = num(0).unwrap_or(100.0) / 100.0,
            "TL" => self.state.leading = num(0).unwrap_or(0.0),
            "Ts" => self.state.rise = num(0).unwrap_or(0.0),
            "Td" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.state.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.tm = m;
                    self.tlm = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                self.state.word_spacing = num(0).unwrap_or(0.0);
                self.state.char_spacing = num(1).unwrap_or(0.0);
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes),
                            other => {
                                if let Some(adjust) = number(other) {
                                    let tx = -adjust / 1000.0
                                        * self.state.size
                                        * self.state.h_scale;
                                    self.tm = Matrix::translate(tx, 0.0).multiply(&self.tm);
                                }
                            }
                        }
                    }
                }
            }
            "Do" => {
                if let Some(xobject) = operands.first().and_then(name) {
                    self.draw_form(xobject);
                }
            }
            _ => {}
        }
    }

    fn draw_form(&mut self, xobject: &[u8]) {
        let doc = self.doc;
        let Some(&form_id) = self.resources.xobjects.get(xobject) else {
            return;
        };
        if self.forms.len() >= MAX_FORM_DEPTH || self.forms.contains(&form_id) {
            debug!("Not descending into form XObject {:?}", form_id);
            return;
        }
        let Ok(stream) = doc.get_object(form_id).and_then(Object::as_stream) else {
            return;
        };
        if stream.dict.get(b"Subtype").ok().and_then(name) != Some(b"Form".as_slice()) {
            return;
        }
        let content: Content<Vec<Operation>> = match stream_bytes(stream)
            .and_then(|bytes| Content::decode(&bytes).map_err(PdfError::from))
        {
            Ok(content) => content,
            Err(e) => {
                debug!("Skipping unreadable form XObject {:?}: {}", form_id, e);
                return;
            }
        };

        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|o| o.as_array().ok())
            .and_then(|items| Matrix::from_operands(items))
            .unwrap_or(Matrix::IDENTITY);
        // Forms without their own resources use the caller's
        let own_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|o| resolve(doc, o).ok())
            .and_then(|o| o.as_dict().ok())
            .map(|dict| Rc::new(Resources::from_dict(doc, dict)));

        let saved_state = self.state.clone();
        let saved_depth = self.stack.len();
        let saved_text = (self.tm, self.tlm);
        let saved_resources = own_resources.map(|r| std::mem::replace(&mut self.resources, r));

        self.state.ctm = matrix.multiply(&self.state.ctm);
        self.forms.push(form_id);
        for operation in &content.operations {
            self.apply(&operation.operator, &operation.operands);
        }
        self.forms.pop();

        if let Some(resources) = saved_resources {
            self.resources = resources;
        }
        self.stack.truncate(saved_depth);
        self.state = saved_state;
        (self.tm, self.tlm) = saved_text;
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.tlm = Matrix::translate(tx, ty).multiply(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.state.leading;
        self.move_line(0.0, -leading);
    }

    fn show(&mut self, bytes: &[u8]) {
        let (text, advance) = {
            let font = self
                .state
                .font
                .as_ref()
                .and_then(|n| self.resources.fonts.get(n))
                .unwrap_or(&self.fallback);
            let state = &self.state;

            let mut text = String::new();
            let mut advance = 0.0;
            for code in font.codes(bytes) {
                font.decode(code, &mut text);
                let mut tx = font.width(code) / 1000.0 * state.size + state.char_spacing;
                if font.code_len == 1 && code == 32 {
                    tx += state.word_spacing;
                }
                advance += tx * state.h_scale;
            }
            (text, advance)
        };

        let trm = self.tm.multiply(&self.state.ctm);
        let (x_start, baseline) = trm.apply(0.0, self.state.rise);
        let (x_end, _) = trm.apply(advance, self.state.rise);
        let size = (self.state.size * trm.vertical_scale()).abs().max(1.0);

        self.tm = Matrix::translate(advance, 0.0).multiply(&self.tm);

        if text.trim().is_empty() {
            return;
        }
        self.push(Line {
            baseline,
            x0: x_start.min(x_end),
            x1: x_start.max(x_end),
            size,
            text,
        });
    }

    fn push(&mut self, span: Line) {
        if let Some(line) = self.current.as_mut() {
            let size = line.size.max(span.size);
            let gap = span.x0 - line.x1;
            let same_baseline = (span.baseline - line.baseline).abs() <= BASELINE_TOLERANCE * size;
            if same_baseline && gap >= -BACKTRACK * size && gap <= BLOCK_GAP * size {
                if gap > SPACE_GAP * size
                    && !line.text.ends_with(char::is_whitespace)
                    && !span.text.starts_with(char::is_whitespace)
                {
                    line.text.push(' ');
                }
                line.text.push_str(&span.text);
                line.x0 = line.x0.min(span.x0);
                line.x1 = line.x1.max(span.x1);
                line.size = size;
                return;
            }
        }

        if let Some(done) = self.current.replace(span) {
            self.lines.push(done);
        }
    }

    fn finish(mut self, page_top: f64) -> Vec<TextBlock> {
        if let Some(done) = self.current.take() {
            self.lines.push(done);
        }
        self.lines
            .into_iter()
            .map(|line| TextBlock {
                x0: line.x0,
                y0: page_top - (line.baseline + ASCENT * line.size),
                x1: line.x1,
                y1: page_top - (line.baseline - DESCENT * line.size),
                text: line.text.split_whitespace().collect::<Vec<_>>().join(" "),
            })
            .collect()
    }
}
