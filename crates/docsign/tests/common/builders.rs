//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Cursor;

use base64::Engine;
use image::{ImageFormat, Rgba, RgbaImage};
use lopdf::{dictionary, Document, Object, Stream};

use docsign::config::{Config, StageConfig, SubmissionCode};

/// Builds Letter-size PDF forms with 12pt Helvetica text lines.
pub struct FormBuilder {
    pages: Vec<Vec<(f64, f64, String)>>,
    forms: Vec<Vec<(f64, f64, String)>>,
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

impl FormBuilder {
    pub fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            forms: vec![Vec::new()],
        }
    }

    /// Adds a text line drawn through its own Form XObject, placed at
    /// (`x`, `y`) by the form's `/Matrix`.
    pub fn form_line(mut self, x: f64, y: f64, text: &str) -> Self {
        if let Some(forms) = self.forms.last_mut() {
            forms.push((x, y, text.to_string()));
        }
        self
    }

    /// Adds a text line with its baseline at (`x`, `y`) in PDF user space.
    pub fn line(mut self, x: f64, y: f64, text: &str) -> Self {
        if let Some(page) = self.pages.last_mut() {
            page.push((x, y, text.to_string()));
        }
        self
    }

    /// Starts a new page.
    pub fn page(mut self) -> Self {
        self.pages.push(Vec::new());
        self.forms.push(Vec::new());
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids: Vec<Object> = Vec::new();
        for (lines, forms) in self.pages.into_iter().zip(self.forms) {
            let mut content: String = lines
                .iter()
                .map(|(x, y, text)| {
                    format!("BT /F1 12 Tf {} {} Td ({}) Tj ET\n", x, y, escape(text))
                })
                .collect();

            let mut xobjects = lopdf::Dictionary::new();
            for (i, (x, y, text)) in forms.iter().enumerate() {
                let form = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Form",
                        "BBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                        "Matrix" => vec![
                            1.into(), 0.into(), 0.into(), 1.into(),
                            Object::Real(*x as f32), Object::Real(*y as f32),
                        ],
                        "Resources" => dictionary! {
                            "Font" => dictionary! { "F1" => font_id },
                        },
                    },
                    format!("BT /F1 12 Tf 0 0 Td ({}) Tj ET", escape(text)).into_bytes(),
                );
                let name = format!("Fm{}", i);
                xobjects.set(name.as_bytes(), doc.add_object(form));
                content.push_str(&format!("q /{} Do Q\n", name));
            }

            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            };
            if !xobjects.is_empty() {
                page.set(
                    "Resources",
                    dictionary! {
                        "Font" => dictionary! { "F1" => font_id },
                        "XObject" => xobjects,
                    },
                );
            }
            kids.push(doc.add_object(page).into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("failed to save test PDF");
        buffer
    }
}

/// A typical approval form: a header, a body and the stage signature label
/// near the bottom of the first page, plus an attachment page.
pub fn approval_form(label: &str) -> Vec<u8> {
    FormBuilder::new()
        .line(72.0, 720.0, "Service Request Form")
        .line(72.0, 680.0, "Description of the requested work")
        .line(72.0, 140.0, label)
        .page()
        .line(72.0, 720.0, "Attachment")
        .build()
}

/// A `data:image/png;base64,...` signature with a transparent background.
pub fn signature_data_url(width: u32, height: u32) -> String {
    let mut image = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    for x in 0..width {
        image.put_pixel(x, height / 2, Rgba([0, 0, 0, 255]));
    }
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .expect("failed to encode test PNG");
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

/// The built-in approval chain with each stage's folder named after its id
/// and no environment lookups.
pub fn builtin_config() -> Config {
    let mut config = Config::builtin();
    for stage in &mut config.stages {
        stage.folder = Some(stage.id.clone());
        stage.folder_env_var = None;
        stage.password_env_var = None;
        stage.password = Some(format!("pw-{}", stage.id));
    }
    config
}

/// Builder for a single stage entry.
pub struct StageBuilder {
    stage: StageConfig,
}

impl StageBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            stage: StageConfig {
                id: id.to_string(),
                name: format!("Stage {}", id),
                group: String::new(),
                folder: Some(id.to_string()),
                folder_env_var: None,
                password: None,
                password_file: None,
                password_env_var: None,
                keywords: Vec::new(),
                routes: BTreeMap::new(),
            },
        }
    }

    pub fn keyword(mut self, keyword: &str) -> Self {
        self.stage.keywords.push(keyword.to_string());
        self
    }

    pub fn route(mut self, code: SubmissionCode, target: &str) -> Self {
        self.stage.routes.insert(code, target.to_string());
        self
    }

    pub fn build(self) -> StageConfig {
        self.stage
    }
}

/// A config with the given stages and `01`/`05` as initial and terminal.
pub fn config_with(stages: Vec<StageConfig>) -> Config {
    let mut config = Config::builtin();
    config.stages = stages;
    config
}
