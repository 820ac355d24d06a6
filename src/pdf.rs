//! A5 document rendering for invoices, payment receipts and result cards.
//!
//! Layout is a fixed top-to-bottom cursor over a single page: a boxed
//! letterhead, detail tables drawn as ruled grids, and a signature footer.
//! Only the builtin Helvetica faces are used, so amounts are written with an
//! ASCII "Rs." prefix.

use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Polygon, Rgb,
};

use crate::db::Student;
use crate::ledger::{self, PaymentKind, PaymentOutcome};

pub const SCHOOL_NAME: &str = "Evergreen Public School";
pub const SCHOOL_ADDRESS: &str =
    "Tirmohani, Nawada Persauni, Gopalganj, Bihar, Pin Code - 841440";
pub const SCHOOL_PROPRIETOR: &str = "Proprietor: Ansar Ali (Munna)";

// A5 portrait, millimetres.
const PAGE_W: f32 = 148.0;
const PAGE_H: f32 = 210.0;
const MARGIN: f32 = 10.0;
const CONTENT_W: f32 = PAGE_W - 2.0 * MARGIN;
const ROW_H: f32 = 7.0;
const PT_TO_MM: f32 = 0.352_778;

#[derive(Debug, Clone)]
pub struct SubjectResult {
    pub subject: String,
    pub marks: f64,
}

pub fn money(v: f64) -> String {
    format!("Rs. {:.2}", v)
}

fn gray(level: f32) -> Color {
    Color::Rgb(Rgb::new(level, level, level, None))
}

struct Sheet {
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    // Cursor: y position of the next element's top edge, mm from page bottom.
    y: f32,
}

impl Sheet {
    fn new(title: &str) -> anyhow::Result<(PdfDocumentReference, Sheet)> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_W), Mm(PAGE_H), "content");
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;
        let layer = doc.get_page(page).get_layer(layer);
        let sheet = Sheet {
            layer,
            regular,
            bold,
            y: PAGE_H - MARGIN,
        };
        Ok((doc, sheet))
    }

    fn font(&self, bold: bool) -> &IndirectFontRef {
        if bold {
            &self.bold
        } else {
            &self.regular
        }
    }

    fn text(&self, s: &str, size_pt: f32, x: f32, y: f32, bold: bool) {
        self.layer.set_fill_color(gray(0.0));
        self.layer.use_text(s, size_pt, Mm(x), Mm(y), self.font(bold));
    }

    /// Helvetica has no metrics at hand; 0.5 em per glyph is close enough
    /// for centering short headings.
    fn text_centered(&self, s: &str, size_pt: f32, y: f32, bold: bool) {
        let est_w = s.chars().count() as f32 * size_pt * 0.5 * PT_TO_MM;
        self.text(s, size_pt, (PAGE_W - est_w) / 2.0, y, bold);
    }

    fn hline(&self, x1: f32, x2: f32, y: f32) {
        self.layer.set_outline_color(gray(0.0));
        self.layer.set_outline_thickness(0.4);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x1), Mm(y)), false),
                (Point::new(Mm(x2), Mm(y)), false),
            ],
            is_closed: false,
        });
    }

    fn vline(&self, x: f32, y1: f32, y2: f32) {
        self.layer.set_outline_color(gray(0.0));
        self.layer.set_outline_thickness(0.4);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x), Mm(y1)), false),
                (Point::new(Mm(x), Mm(y2)), false),
            ],
            is_closed: false,
        });
    }

    fn rect_outline(&self, x: f32, y_bottom: f32, w: f32, h: f32) {
        self.layer.set_outline_color(gray(0.0));
        self.layer.set_outline_thickness(0.4);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x), Mm(y_bottom)), false),
                (Point::new(Mm(x + w), Mm(y_bottom)), false),
                (Point::new(Mm(x + w), Mm(y_bottom + h)), false),
                (Point::new(Mm(x), Mm(y_bottom + h)), false),
            ],
            is_closed: true,
        });
    }

    fn rect_fill(&self, x: f32, y_bottom: f32, w: f32, h: f32, level: f32) {
        self.layer.set_fill_color(gray(level));
        self.layer.add_polygon(Polygon {
            rings: vec![vec![
                (Point::new(Mm(x), Mm(y_bottom)), false),
                (Point::new(Mm(x + w), Mm(y_bottom)), false),
                (Point::new(Mm(x + w), Mm(y_bottom + h)), false),
                (Point::new(Mm(x), Mm(y_bottom + h)), false),
            ]],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        });
    }

    fn advance(&mut self, dy: f32) {
        self.y -= dy;
    }

    /// Boxed school letterhead shared by every document.
    fn letterhead(&mut self, extra_line: Option<&str>) {
        let h = if extra_line.is_some() { 26.0 } else { 21.0 };
        let bottom = self.y - h;
        self.rect_fill(MARGIN, bottom, CONTENT_W, h, 0.9);
        self.rect_outline(MARGIN, bottom, CONTENT_W, h);
        self.text_centered(SCHOOL_NAME, 13.0, self.y - 7.0, true);
        self.text_centered(SCHOOL_ADDRESS, 7.0, self.y - 12.5, false);
        self.text_centered(SCHOOL_PROPRIETOR, 7.0, self.y - 17.0, false);
        if let Some(line) = extra_line {
            self.text_centered(line, 8.0, self.y - 22.5, true);
        }
        self.advance(h + 4.0);
    }

    /// Ruled grid. `cols` are widths in mm summing to the content width;
    /// `shaded_header` shades and bolds the first row, `bold_last` bolds the
    /// final row (totals).
    fn table(&mut self, cols: &[f32], rows: &[Vec<String>], shaded_header: bool, bold_last: bool) {
        let top = self.y;
        let total_h = rows.len() as f32 * ROW_H;
        let bottom = top - total_h;

        if shaded_header && !rows.is_empty() {
            self.rect_fill(MARGIN, top - ROW_H, CONTENT_W, ROW_H, 0.8);
        }

        for (i, row) in rows.iter().enumerate() {
            let baseline = top - (i as f32 + 1.0) * ROW_H + 2.2;
            let row_bold =
                (shaded_header && i == 0) || (bold_last && i + 1 == rows.len());
            let mut x = MARGIN;
            for (c, cell) in row.iter().enumerate() {
                self.text(cell, 8.0, x + 2.0, baseline, row_bold);
                x += cols.get(c).copied().unwrap_or(0.0);
            }
        }

        for i in 0..=rows.len() {
            self.hline(MARGIN, MARGIN + CONTENT_W, top - i as f32 * ROW_H);
        }
        let mut x = MARGIN;
        self.vline(x, bottom, top);
        for w in cols {
            x += w;
            self.vline(x, bottom, top);
        }

        self.y = bottom;
        self.advance(4.0);
    }

    /// Two-column labelled detail box (Name / Class, Student ID / Roll ...).
    fn detail_box(&mut self, pairs: &[(String, String)]) {
        let rows: Vec<Vec<String>> = pairs
            .iter()
            .map(|(l, r)| vec![l.clone(), r.clone()])
            .collect();
        self.table(&[CONTENT_W / 2.0, CONTENT_W / 2.0], &rows, false, false);
    }

    fn signature_footer(&mut self, date: &str, label: &str) {
        let y = self.y - 8.0;
        self.text_centered("____________________", 8.0, y, false);
        self.text_centered(label, 8.0, y - 5.0, false);
        self.text_centered(&format!("Date: {}", date), 8.0, y - 10.0, false);
    }
}

fn student_identity_pairs(student: &Student) -> Vec<(String, String)> {
    vec![
        (
            format!("Name: {}", student.full_name()),
            format!("Class: {}", student.class_name.as_deref().unwrap_or("-")),
        ),
        (
            format!("Student ID: {}", student.student_id),
            format!(
                "Roll Number: {}",
                student.roll_number.as_deref().unwrap_or("-")
            ),
        ),
    ]
}

pub fn generate_invoice(
    student: &Student,
    school_fee: f64,
    bus_fee: f64,
    invoice_id: &str,
    invoice_date: &str,
) -> anyhow::Result<Vec<u8>> {
    let (doc, mut sheet) = Sheet::new("Fee Invoice")?;

    sheet.letterhead(None);
    sheet.text_centered("Fee Invoice", 10.0, sheet.y - 4.0, true);
    sheet.advance(8.0);

    sheet.text(&format!("Invoice No: {}", invoice_id), 8.0, MARGIN, sheet.y - 3.0, false);
    sheet.text(
        &format!("Date: {}", invoice_date),
        8.0,
        MARGIN + CONTENT_W / 2.0,
        sheet.y - 3.0,
        false,
    );
    sheet.advance(7.0);

    sheet.detail_box(&student_identity_pairs(student));

    let outstanding = student.outstanding_balance;
    let extra = student.extra_balance;
    let adjusted_total = ledger::invoice_total(school_fee, bus_fee, outstanding, extra);

    let mut fee_rows: Vec<Vec<String>> = vec![
        vec!["S.No.".into(), "Description".into(), "Amount".into()],
        vec!["1".into(), "School Fee".into(), money(school_fee)],
        vec!["2".into(), "Bus Fee".into(), money(bus_fee)],
    ];
    let mut serial = 3;
    if outstanding > 0.0 {
        fee_rows.push(vec![
            serial.to_string(),
            "Previous Outstanding".into(),
            money(outstanding),
        ]);
        serial += 1;
    }
    if extra > 0.0 {
        fee_rows.push(vec![
            serial.to_string(),
            "Previous Extra (Deducted)".into(),
            money(extra),
        ]);
    }
    fee_rows.push(vec!["".into(), "Total".into(), money(adjusted_total)]);
    sheet.table(&[14.0, 80.0, 34.0], &fee_rows, true, true);

    sheet.signature_footer(invoice_date, "Authorized Signature");

    Ok(doc.save_to_bytes()?)
}

#[allow(clippy::too_many_arguments)]
pub fn generate_receipt(
    student: &Student,
    school_fee: f64,
    bus_fee: f64,
    amount: f64,
    payment_id: &str,
    payment_date: &str,
    outcome: &PaymentOutcome,
) -> anyhow::Result<Vec<u8>> {
    let (doc, mut sheet) = Sheet::new("Payment Receipt")?;

    sheet.letterhead(None);
    sheet.text_centered("Payment Receipt", 11.0, sheet.y - 4.0, true);
    sheet.advance(8.0);

    sheet.text(&format!("Payment ID: {}", payment_id), 8.0, MARGIN, sheet.y - 3.0, false);
    sheet.text(
        &format!("Date: {}", payment_date),
        8.0,
        MARGIN + CONTENT_W / 2.0,
        sheet.y - 3.0,
        false,
    );
    sheet.advance(7.0);

    sheet.detail_box(&student_identity_pairs(student));

    let total_due = school_fee + bus_fee;
    let previous_extra = student.extra_balance;
    let payment_type = match outcome.kind(amount) {
        PaymentKind::Full => "Full Payment",
        PaymentKind::Partial => "Partial Payment",
    };

    let mut rows: Vec<Vec<String>> = vec![
        vec!["Description".into(), "Amount".into()],
        vec!["School Fee".into(), money(school_fee)],
        vec!["Bus Fee".into(), money(bus_fee)],
        vec!["Total Due".into(), money(total_due)],
    ];
    if previous_extra > 0.0 {
        rows.push(vec![
            "Previous Extra (Deducted)".into(),
            money(previous_extra),
        ]);
        rows.push(vec!["Effective Total Due".into(), money(outcome.effective_due)]);
    }
    rows.push(vec!["Amount Paid".into(), money(amount)]);
    rows.push(vec![
        "Outstanding (This Transaction)".into(),
        money(outcome.transaction_outstanding),
    ]);
    if outcome.transaction_extra > 0.0 {
        rows.push(vec![
            "Extra Amount (This Transaction)".into(),
            money(outcome.transaction_extra),
        ]);
    }
    rows.push(vec![
        "Total Outstanding Balance".into(),
        money(outcome.new_outstanding),
    ]);
    rows.push(vec!["Total Extra Balance".into(), money(outcome.new_extra)]);
    rows.push(vec!["Payment Type".into(), payment_type.into()]);
    sheet.table(&[88.0, 40.0], &rows, true, true);

    sheet.text_centered("Thank you for your payment!", 8.0, sheet.y - 4.0, false);
    sheet.advance(8.0);
    sheet.signature_footer(payment_date, "Authorized Signature");

    Ok(doc.save_to_bytes()?)
}

pub fn generate_result_card(
    student: &Student,
    results: &[SubjectResult],
    academic_year: &str,
    attendance_percentage: f64,
    generated_date: &str,
) -> anyhow::Result<Vec<u8>> {
    let (doc, mut sheet) = Sheet::new("Result Card")?;

    sheet.letterhead(Some(&format!("Academic Year: {}", academic_year)));

    let mut pairs = student_identity_pairs(student);
    pairs.push((
        format!("Father's Name: {}", student.father_name),
        format!("Mother's Name: {}", student.mother_name),
    ));
    pairs.push((
        format!("Date of Birth: {}", student.dob.as_deref().unwrap_or("-")),
        format!("Admission Date: {}", student.doa.as_deref().unwrap_or("-")),
    ));
    sheet.detail_box(&pairs);

    sheet.text("Academic Performance", 9.0, MARGIN, sheet.y - 3.0, true);
    sheet.advance(6.0);

    let mut mark_rows: Vec<Vec<String>> = vec![vec![
        "S.No.".into(),
        "Subject".into(),
        "Marks".into(),
        "Max".into(),
        "Grade".into(),
        "Status".into(),
    ]];
    for (idx, result) in results.iter().enumerate() {
        let status = if ledger::is_pass(result.marks) {
            "Pass"
        } else {
            "Fail"
        };
        mark_rows.push(vec![
            (idx + 1).to_string(),
            result.subject.clone(),
            format!("{:.0}", result.marks),
            format!("{:.0}", ledger::MAX_MARKS_PER_SUBJECT),
            ledger::grade_for(result.marks).to_string(),
            status.to_string(),
        ]);
    }
    sheet.table(&[12.0, 56.0, 16.0, 16.0, 14.0, 14.0], &mark_rows, true, false);

    let marks: Vec<f64> = results.iter().map(|r| r.marks).collect();
    let summary = ledger::summarize_results(&marks);

    sheet.text("Summary", 9.0, MARGIN, sheet.y - 3.0, true);
    sheet.advance(6.0);
    let summary_rows: Vec<Vec<String>> = vec![
        vec!["Total Marks".into(), format!("{:.0}", summary.total_marks)],
        vec!["Max Marks".into(), format!("{:.0}", summary.max_marks)],
        vec!["Percentage".into(), format!("{:.1}%", summary.percentage)],
        vec!["Grade".into(), summary.grade.to_string()],
        vec!["Attendance".into(), format!("{:.0}%", attendance_percentage)],
        vec!["Remarks".into(), summary.remarks.to_string()],
    ];
    sheet.table(&[32.0, 96.0], &summary_rows, false, false);

    sheet.text(&format!("Date: {}", generated_date), 7.0, MARGIN, sheet.y - 8.0, false);
    sheet.text_centered("School Stamp", 8.0, sheet.y - 8.0, false);
    sheet.text("____________________", 8.0, PAGE_W - MARGIN - 38.0, sheet.y - 8.0, false);
    sheet.text("Principal's Signature", 8.0, PAGE_W - MARGIN - 36.0, sheet.y - 13.0, false);

    Ok(doc.save_to_bytes()?)
}
