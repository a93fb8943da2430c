//! Keyword location and signature placement on generated forms.

mod common;

use lopdf::Document;

use common::{signature_data_url, FormBuilder};
use docsign::compositor::{self, Placement};
use docsign::{locate, Anchor};

/// A single locate call over a one-page form.
struct LocateTestCase {
    name: &'static str,
    lines: &'static [(f64, f64, &'static str)],
    keywords: &'static [&'static str],
    /// Baseline of the expected block, or `None` for no match.
    expected_baseline: Option<f64>,
}

const LOCATE_CASES: &[LocateTestCase] = &[
    LocateTestCase {
        name: "single exact block",
        lines: &[(72.0, 700.0, "Form"), (90.0, 150.0, "SPV")],
        keywords: &["SPV"],
        expected_baseline: Some(150.0),
    },
    LocateTestCase {
        name: "substring only",
        lines: &[(72.0, 400.0, "DESCRIPTION OF WORK")],
        keywords: &["SR"],
        expected_baseline: None,
    },
    LocateTestCase {
        name: "lowest of two matches",
        lines: &[(72.0, 500.0, "GM"), (72.0, 120.0, "Approved: GM")],
        keywords: &["GM"],
        expected_baseline: Some(120.0),
    },
    LocateTestCase {
        name: "case insensitive phrase",
        lines: &[(72.0, 260.0, "finance   MANAGER signature")],
        keywords: &["Finance Manager"],
        expected_baseline: Some(260.0),
    },
    LocateTestCase {
        name: "any keyword of the set",
        lines: &[(72.0, 600.0, "Meri"), (72.0, 300.0, "Fin Manager")],
        keywords: &["Finance Manager", "Fin Manager", "Nindy", "Meri"],
        expected_baseline: Some(300.0),
    },
    LocateTestCase {
        name: "no keywords",
        lines: &[(72.0, 300.0, "GA")],
        keywords: &[],
        expected_baseline: None,
    },
];

// 12pt Helvetica: the block top sits 0.8em above the baseline.
const ASCENT: f64 = 9.6;

#[test]
fn test_locate_cases() {
    for case in LOCATE_CASES {
        let mut builder = FormBuilder::new();
        for (x, y, text) in case.lines {
            builder = builder.line(*x, *y, text);
        }
        let pdf = builder.build();

        let anchor = locate(&pdf, case.keywords).unwrap();
        match case.expected_baseline {
            Some(baseline) => {
                let anchor = anchor.unwrap_or_else(|| panic!("case {}: no anchor", case.name));
                assert_eq!(anchor.page, 0, "case {}", case.name);
                let expected_y = 792.0 - (baseline + ASCENT);
                assert!(
                    (anchor.y - expected_y).abs() < 1e-6,
                    "case {}: y {} != {}",
                    case.name,
                    anchor.y,
                    expected_y
                );
            }
            None => assert!(anchor.is_none(), "case {}: unexpected {:?}", case.name, anchor),
        }
    }
}

#[test]
fn test_keyword_inside_form_xobject() {
    let pdf = FormBuilder::new()
        .line(72.0, 700.0, "Vehicle Repair Request")
        .form_line(90.0, 150.0, "SPV")
        .build();
    let anchor = locate(&pdf, &["SPV"]).unwrap().expect("form text is searched");
    assert!((anchor.x - 90.0).abs() < 1e-6);
    assert!((anchor.y - (792.0 - (150.0 + ASCENT))).abs() < 1e-6);

    // Page text and form text compete on position alone
    let pdf = FormBuilder::new()
        .form_line(72.0, 400.0, "GM")
        .line(72.0, 120.0, "GM")
        .build();
    let anchor = locate(&pdf, &["GM"]).unwrap().unwrap();
    assert!((anchor.y - (792.0 - (120.0 + ASCENT))).abs() < 1e-6);
}

#[test]
fn test_only_first_page_is_searched() {
    let pdf = FormBuilder::new()
        .line(72.0, 700.0, "Request")
        .page()
        .line(72.0, 200.0, "HRGA")
        .build();
    assert_eq!(locate(&pdf, &["HRGA"]).unwrap(), None);
}

#[test]
fn test_anchor_x_is_block_left_edge() {
    let pdf = FormBuilder::new().line(123.5, 200.0, "PAMO").build();
    let anchor = locate(&pdf, &["pamo"]).unwrap().unwrap();
    assert!((anchor.x - 123.5).abs() < 1e-6);
}

#[test]
fn test_placement_geometry() {
    let anchor = Anchor {
        page: 0,
        x: 100.0,
        y: 500.0,
    };
    // 200 x 100 px at 0.3 * 1.5 is 90 x 45 pt
    let placement = Placement::for_anchor(&anchor, 200, 100);
    assert!((placement.width - 90.0).abs() < 1e-9);
    assert!((placement.height - 45.0).abs() < 1e-9);
    // left edge 0.2w left of the anchor
    assert!((placement.left - 82.0).abs() < 1e-9);
    // vertical centre 0.75h above the anchor
    let centre = placement.top + placement.height / 2.0;
    assert!((centre - (500.0 - 33.75)).abs() < 1e-9);
}

#[test]
fn test_composite_preserves_other_pages() {
    let pdf = FormBuilder::new()
        .line(72.0, 150.0, "GA")
        .page()
        .line(72.0, 700.0, "Page two")
        .page()
        .line(72.0, 700.0, "Page three")
        .build();
    let anchor = locate(&pdf, &["GA"]).unwrap().unwrap();
    let signed = compositor::composite(&pdf, &anchor, &signature_data_url(120, 40)).unwrap();

    let before = Document::load_mem(&pdf).unwrap();
    let after = Document::load_mem(&signed).unwrap();
    for page_number in [2u32, 3] {
        let content = |doc: &Document| {
            let id = *doc.get_pages().get(&page_number).unwrap();
            doc.get_page_content(id).unwrap()
        };
        assert_eq!(content(&before), content(&after), "page {}", page_number);
    }

    // Input bytes are never modified in place
    assert_ne!(pdf, signed);
    assert!(locate(&signed, &["GA"]).unwrap().is_some());
}
