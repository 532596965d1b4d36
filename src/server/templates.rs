//! HTML pages: the upload form and the results page.

use serde::Serialize;
use std::fmt::Write;

/// One timed step of an upload, shown on the results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentStep {
    pub label: String,
    pub duration_ms: u64,
}

/// What the results page shows.
#[derive(Debug, Default)]
pub struct ResultView<'a> {
    pub error: Option<&'a str>,
    /// Set on success.
    pub download_url: Option<&'a str>,
    pub filename: Option<&'a str>,
    pub steps: &'a [AgentStep],
    pub logs: &'a [String],
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"<style>
body{font-family:Helvetica,Arial,sans-serif;background:#f5f6fa;color:#222;margin:0}
main{max-width:720px;margin:40px auto;background:#fff;padding:32px;border-radius:8px;box-shadow:0 2px 8px rgba(0,0,0,.08)}
h1{color:#1a237e;font-size:24px;margin-top:0}
.hint{color:#666;font-size:14px}
.error{background:#ffebee;color:#b71c1c;padding:12px 16px;border-radius:6px}
.success{background:#e3f2fd;color:#1a237e;padding:12px 16px;border-radius:6px}
button,.button{background:#1a237e;color:#fff;border:0;padding:10px 20px;border-radius:6px;font-size:15px;text-decoration:none;display:inline-block;cursor:pointer}
table{border-collapse:collapse;width:100%;margin:16px 0;font-size:14px}
td,th{border-bottom:1px solid #ddd;padding:6px 8px;text-align:left}
td.ms{text-align:right;font-variant-numeric:tabular-nums}
pre{background:#263238;color:#eceff1;padding:12px;border-radius:6px;font-size:13px;white-space:pre-wrap}
</style>"#;

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"it\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n{STYLE}\n</head>\n<body>\n<main>\n{body}</main>\n</body>\n</html>\n",
        escape_html(title)
    )
}

/// The upload form carrying `csrf_token`.
pub fn index_page(csrf_token: &str, max_files: usize, max_file_size_mb: f64) -> String {
    let body = format!(
        "<h1>Bilancio d'esercizio</h1>\n\
         <p class=\"hint\">Upload up to {max_files} PDF financial statements \
         (maximum {max_file_size_mb:.0}MB each). The analysis takes a few minutes.</p>\n\
         <form action=\"/upload\" method=\"post\" enctype=\"multipart/form-data\">\n\
         <input type=\"hidden\" name=\"csrf_token\" value=\"{}\">\n\
         <p><input type=\"file\" name=\"files\" accept=\".pdf,application/pdf\" multiple required></p>\n\
         <button type=\"submit\">Generate balance sheet</button>\n\
         </form>\n",
        escape_html(csrf_token)
    );
    page("Bilancio d'esercizio", &body)
}

pub fn result_page(view: &ResultView<'_>) -> String {
    let mut body = String::from("<h1>Bilancio d'esercizio</h1>\n");

    if let Some(error) = view.error {
        let _ = writeln!(body, "<p class=\"error\">{}</p>", escape_html(error));
    }
    if let Some(url) = view.download_url {
        let _ = writeln!(
            body,
            "<p class=\"success\">Balance sheet generated: {}</p>\n\
             <p><a class=\"button\" href=\"{}\">Download PDF</a></p>",
            escape_html(view.filename.unwrap_or("bilancio_completo.pdf")),
            escape_html(url)
        );
    }

    if !view.steps.is_empty() {
        body.push_str("<h2>Steps</h2>\n<table>\n<tr><th>Step</th><th>Duration (ms)</th></tr>\n");
        for step in view.steps {
            let _ = writeln!(
                body,
                "<tr><td>{}</td><td class=\"ms\">{}</td></tr>",
                escape_html(&step.label),
                step.duration_ms
            );
        }
        body.push_str("</table>\n");
    }

    if !view.logs.is_empty() {
        body.push_str("<h2>Agent log</h2>\n<pre>");
        for line in view.logs {
            body.push_str(&escape_html(line));
            body.push('\n');
        }
        body.push_str("</pre>\n");
    }

    body.push_str("<p><a href=\"/\">Back to upload</a></p>\n");
    page("Bilancio d'esercizio", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">R&D's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;R&amp;D&#x27;s&lt;/a&gt;"
        );
    }

    #[test]
    fn index_embeds_token() {
        let html = index_page("tok-123", 5, 10.0);
        assert!(html.contains(r#"name="csrf_token" value="tok-123""#));
        assert!(html.contains("up to 5 PDF"));
        assert!(html.contains("maximum 10MB"));
    }

    #[test]
    fn result_page_lists_steps_and_logs() {
        let steps = [AgentStep {
            label: "PDF generation".into(),
            duration_ms: 42,
        }];
        let logs = ["Saved 1 file(s) to disk.".to_string()];
        let html = result_page(&ResultView {
            download_url: Some("/download/abc_bilancio.pdf"),
            filename: Some("abc_bilancio.pdf"),
            steps: &steps,
            logs: &logs,
            ..Default::default()
        });
        assert!(html.contains("href=\"/download/abc_bilancio.pdf\""));
        assert!(html.contains("<td>PDF generation</td><td class=\"ms\">42</td>"));
        assert!(html.contains("Saved 1 file(s) to disk."));
        assert!(!html.contains("class=\"error\""));
    }

    #[test]
    fn result_page_escapes_error() {
        let html = result_page(&ResultView {
            error: Some("Invalid file type: <x>.exe"),
            ..Default::default()
        });
        assert!(html.contains("Invalid file type: &lt;x&gt;.exe"));
    }
}
