//! JSON report: a summary block followed by every result, extras included.

use crate::analyzer::AnalysisResult;
use crate::report::Summary;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Serialize)]
struct Report<'a> {
    generated: String,
    summary: Summary,
    results: &'a [AnalysisResult],
}

pub fn write<W: Write>(writer: &mut W, results: &[AnalysisResult]) -> io::Result<()> {
    let report = Report {
        generated: chrono::Local::now().to_rfc3339(),
        summary: Summary::from_results(results),
        results,
    };
    serde_json::to_writer_pretty(&mut *writer, &report)?;
    writeln!(writer)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Label;
    use crate::report::tests::create_test_result;
    use serde_json::Value;

    fn render(results: &[AnalysisResult]) -> Value {
        let mut out = Vec::new();
        write(&mut out, results).unwrap();
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn test_summary_and_results_present() {
        let results = vec![
            create_test_result(Label::Authentic, "a.png"),
            create_test_result(Label::Manipulated, "b.png"),
        ];
        let v = render(&results);
        assert_eq!(v["summary"]["total"], 2);
        assert_eq!(v["summary"]["manipulated"], 1);
        assert_eq!(v["results"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_labels_are_lowercase() {
        let v = render(&[create_test_result(Label::Manipulated, "b.png")]);
        assert_eq!(v["results"][0]["label"], "manipulated");
        assert_eq!(v["results"][0]["media_kind"], "image");
        assert_eq!(v["results"][0]["extras"]["modality"], "none");
    }

    #[test]
    fn test_error_field_serialized() {
        let v = render(&[create_test_result(Label::Error, "x.png")]);
        assert_eq!(v["results"][0]["error"], "could not decode image");
        assert_eq!(v["results"][0]["suspicious_regions"][0], "Analysis failed");
    }
}
