// ============================================================
// HTML PAGE
// ============================================================
// Server-rendered single page for the current session state

use crate::domain::session::{PreviewView, SessionView};
use crate::domain::summary::TableSummary;

const TITLE: &str = "🪶 Feather to CSV Converter";
const SUBTITLE: &str = "Upload a feather file to convert it to CSV format";

const ABOUT_FEATHER: &str = r#"<details class="about">
<summary>ℹ️ About Feather Format</summary>
<p><strong>Feather</strong> is a fast, lightweight, and easy-to-use binary columnar serialization format.</p>
<p><strong>Advantages of Feather:</strong></p>
<ul>
<li>Very fast read/write operations</li>
<li>Preserves data types</li>
<li>Cross-language compatibility (Python, R, etc.)</li>
<li>Efficient storage</li>
</ul>
<p><strong>When to convert to CSV:</strong></p>
<ul>
<li>Need compatibility with tools that don't support feather</li>
<li>Want human-readable format</li>
<li>Need to import into Excel or other spreadsheet applications</li>
</ul>
</details>"#;

const STYLE: &str = r#"<style>
body { font-family: sans-serif; max-width: 960px; margin: 2rem auto; padding: 0 1rem; }
.banner { padding: .75rem 1rem; border-radius: .4rem; margin: 1rem 0; }
.success { background: #e6f4ea; } .error { background: #fdecea; } .info { background: #e8f0fe; }
.metrics { display: flex; gap: 2rem; } .metric .value { font-size: 1.8rem; }
table { border-collapse: collapse; width: 100%; margin: .5rem 0 1.5rem; }
th, td { border: 1px solid #ddd; padding: .25rem .5rem; text-align: left; }
td.missing { color: #999; }
.grid { overflow-x: auto; }
</style>"#;

const SCRIPT: &str = r#"<script>
async function send(method, url, body, headers) {
  const res = await fetch(url, { method, body, headers, credentials: 'same-origin' });
  if (!res.ok && res.status !== 422) { alert(await res.text()); }
  window.location.reload();
}
document.getElementById('file')?.addEventListener('change', (e) => {
  const file = e.target.files[0];
  if (!file) { send('DELETE', '/api/session'); return; }
  send('POST', '/api/session/upload?file_name=' + encodeURIComponent(file.name), file,
    { 'Content-Type': 'application/octet-stream' });
});
document.getElementById('clear')?.addEventListener('click', () => send('DELETE', '/api/session'));
document.getElementById('preview-rows')?.addEventListener('change', (e) => {
  send('PUT', '/api/session/preview', JSON.stringify({ rows: Number(e.target.value) }),
    { 'Content-Type': 'application/json' });
});
document.getElementById('preview-rows')?.addEventListener('input', (e) => {
  document.getElementById('preview-rows-value').textContent = e.target.value;
});
</script>"#;

pub fn render_page(view: &SessionView, accept_extension: Option<&str>) -> String {
    let mut html = String::with_capacity(8 * 1024);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_html(TITLE)));
    html.push_str(STYLE);
    html.push_str("\n</head>\n<body>\n");
    html.push_str(&format!("<h1>{}</h1>\n<p>{}</p>\n", TITLE, SUBTITLE));
    html.push_str(&render_uploader(view, accept_extension));

    match view {
        SessionView::Idle => {
            html.push_str(&banner("info", "👆 Please upload a feather file to get started"));
            html.push_str(ABOUT_FEATHER);
        }
        SessionView::Loaded { file_name } => {
            html.push_str(&banner(
                "info",
                &format!("Reading {}…", escape_html(file_name)),
            ));
        }
        SessionView::Error { message, hint, .. } => {
            html.push_str(&banner("error", &format!("❌ {}", escape_html(message))));
            html.push_str(&format!("<p>{}</p>\n", escape_html(hint)));
        }
        SessionView::Ready {
            summary,
            preview,
            download,
            ..
        } => {
            html.push_str(&banner("success", "✅ File loaded successfully!"));
            html.push_str(&render_metrics(summary));
            html.push_str("<h2>📊 Dataset Overview</h2>\n<p><strong>Column Information:</strong></p>\n");
            html.push_str(&render_column_info(summary));
            html.push_str("<h2>👀 Data Preview</h2>\n");
            html.push_str(&render_preview(preview));
            html.push_str("<h2>💾 Download CSV</h2>\n");
            html.push_str(&format!(
                "<p><a href=\"/api/session/download\" download=\"{name}\" title=\"Download the converted file as {name}\">📥 Download as CSV</a></p>\n",
                name = escape_html(&download.file_name)
            ));
            html.push_str(&banner(
                "info",
                &format!(
                    "🔄 Ready to download <strong>{}</strong> ({} characters)",
                    escape_html(&download.file_name),
                    format_thousands(download.char_count)
                ),
            ));
        }
    }

    html.push_str(SCRIPT);
    html.push_str("\n</body>\n</html>\n");
    html
}

fn render_uploader(view: &SessionView, accept_extension: Option<&str>) -> String {
    let accept = accept_extension
        .map(|ext| format!(" accept=\".{}\"", escape_html(ext)))
        .unwrap_or_default();
    let clear = if matches!(view, SessionView::Idle) {
        String::new()
    } else {
        "<button id=\"clear\" type=\"button\">Clear</button>".to_string()
    };
    format!(
        "<p><label for=\"file\">Choose a feather file</label><br>\
         <input id=\"file\" type=\"file\"{} title=\"Select a .feather file to convert to CSV\"> {}</p>\n",
        accept, clear
    )
}

fn banner(kind: &str, inner_html: &str) -> String {
    format!("<div class=\"banner {}\">{}</div>\n", kind, inner_html)
}

fn render_metrics(summary: &TableSummary) -> String {
    let metric = |label: &str, value: &str| {
        format!(
            "<div class=\"metric\"><div class=\"label\">{}</div><div class=\"value\">{}</div></div>",
            label, value
        )
    };
    format!(
        "<div class=\"metrics\">{}{}{}</div>\n",
        metric("Rows", &summary.row_count.to_string()),
        metric("Columns", &summary.column_count.to_string()),
        metric("Memory Usage", &summary.memory_display()),
    )
}

fn render_column_info(summary: &TableSummary) -> String {
    let mut html = String::from(
        "<div class=\"grid\"><table class=\"columns\">\n<tr><th>Column</th><th>Data Type</th><th>Non-Null Count</th><th>Null Count</th></tr>\n",
    );
    for column in &summary.columns {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&column.name),
            escape_html(&column.data_type),
            column.non_null_count,
            column.null_count
        ));
    }
    html.push_str("</table></div>\n");
    html
}

fn render_preview(preview: &PreviewView) -> String {
    let mut html = String::new();
    if preview.max_rows > 0 {
        html.push_str(&format!(
            "<p><label for=\"preview-rows\">Number of rows to preview:</label> \
             <input id=\"preview-rows\" type=\"range\" min=\"{}\" max=\"{}\" value=\"{}\"> \
             <span id=\"preview-rows-value\">{}</span></p>\n",
            preview.min_rows, preview.max_rows, preview.rows, preview.rows
        ));
    }

    html.push_str("<div class=\"grid\"><table class=\"preview\">\n<tr>");
    for column in &preview.columns {
        html.push_str(&format!("<th>{}</th>", escape_html(column)));
    }
    html.push_str("</tr>\n");
    for row in &preview.data {
        html.push_str("<tr>");
        for cell in row {
            match cell {
                Some(value) => html.push_str(&format!("<td>{}</td>", escape_html(value))),
                None => html.push_str("<td class=\"missing\">None</td>"),
            }
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table></div>\n");
    html
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `1234567` -> `1,234,567`
pub fn format_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
