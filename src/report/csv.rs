//! CSV report, one row per analyzed file.

use crate::analyzer::AnalysisResult;
use std::io::{self, Write};

const HEADER: &str = "file_path,file_name,media_kind,label,is_deepfake,confidence,trust_score,raw_score,suspicious_regions,model_used,analysis_time,reason,error";

/// Quote a field when it contains a delimiter, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn write<W: Write>(writer: &mut W, results: &[AnalysisResult]) -> io::Result<()> {
    writeln!(writer, "{}", HEADER)?;

    for r in results {
        let kind = r.media_kind.map(|k| k.to_string()).unwrap_or_default();
        let fields = [
            escape(&r.file_path),
            escape(&r.file_name),
            kind,
            r.label.to_string(),
            r.is_deepfake.to_string(),
            r.confidence.to_string(),
            r.trust_score.to_string(),
            format!("{:.4}", r.raw_score),
            escape(&r.suspicious_regions.join("; ")),
            escape(&r.model_used.join("; ")),
            format!("{:.3}", r.analysis_time),
            escape(&r.reason),
            escape(r.error.as_deref().unwrap_or("")),
        ];
        writeln!(writer, "{}", fields.join(","))?;
    }

    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Label;
    use crate::report::tests::create_test_result;

    // ==========================================================================
    // QUOTING
    // ==========================================================================
    //
    // Reasons are full sentences and paths can contain anything, so fields are
    // quoted RFC 4180 style only when they need it.

    #[test]
    fn test_plain_field_is_untouched() {
        assert_eq!(escape("photo.png"), "photo.png");
    }

    #[test]
    fn test_comma_and_quote_are_escaped() {
        assert_eq!(escape("a, b"), "\"a, b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_rows() {
        let results = vec![
            create_test_result(Label::Manipulated, "fake, really.png"),
            create_test_result(Label::Authentic, "ok.png"),
        ];
        let mut out = Vec::new();
        write(&mut out, &results).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3, "header plus one line per result");
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].starts_with("\"/media/fake, really.png\",\"fake, really.png\",image,MANIPULATED,true,85,15,0.8500,"));
        assert!(lines[1].contains("Edge artifacts; Frequency domain anomalies"));
        assert!(lines[2].contains(",AUTHENTIC,false,60,92,"));
    }
}
