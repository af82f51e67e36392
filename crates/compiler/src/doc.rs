//! HTML documentation generator.
//!
//! `opal --doc <file>` writes `doc.html`: the trimmed source, the token
//! stream and the compiled bytecode listing on one page.

use std::fmt::Write as _;

use opal_core::bytecode::Instruction;

use crate::error::CompileError;
use crate::lexer;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Render the documentation page for one source file.
pub fn render(name: &str, source: &str, buffer: &[Instruction]) -> Result<String, CompileError> {
    let mut html = String::new();

    let _ = writeln!(html, "<html>");
    let _ = writeln!(html, "<head>");
    let _ = writeln!(html, "<title>{} Documentation</title>", escape(name));
    let _ = writeln!(html, "<meta charset=\"utf-8\">");
    let _ = writeln!(
        html,
        "<style>body{{background:#fff;color:#333;font:16px/25px georgia,serif;margin:0 auto;width:800px}}h1{{font:500 36px/60px helvetica,arial,sans-serif;color:#9ca0a3}}h2{{font:500 24px helvetica,arial,sans-serif;color:#9ca0a3;margin:24px 0 0}}pre{{color:#52667a;font:13px Menlo,Monaco,Consolas,monospace;background:#f9fafb;border:1px solid #f0f3f5;padding:10px;overflow:auto}}</style>"
    );
    let _ = writeln!(html, "</head>");
    let _ = writeln!(html, "<body>");
    let _ = writeln!(html, "<h1>{}</h1>", escape(name));

    let _ = writeln!(html, "<h2>Code</h2>");
    let _ = writeln!(html, "<pre>{}</pre>", escape(source.trim()));

    let _ = writeln!(html, "<h2>Tokens</h2>");
    let tokens = lexer::scan(name, source)?;
    let rendered: Vec<String> = tokens.iter().map(|t| escape(&t.text)).collect();
    let _ = writeln!(html, "<pre>{}</pre>", rendered.join(", "));

    let _ = writeln!(html, "<h2>Bytecode</h2>");
    let _ = writeln!(html, "<pre>");
    for (index, instruction) in buffer.iter().enumerate() {
        let _ = writeln!(html, "{:03}: {}", index, escape(&instruction.to_string()));
    }
    let _ = writeln!(html, "</pre>");

    let _ = writeln!(html, "</body>");
    let _ = writeln!(html, "</html>");
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen;

    #[test]
    fn test_page_contains_all_sections() {
        let source = "using core\nprintln(2 * 3)";
        let buffer = codegen::compile_source("demo.opal", source).unwrap();
        let html = render("demo.opal", source, &buffer).unwrap();

        assert!(html.contains("<h1>demo.opal</h1>"));
        assert!(html.contains("<h2>Code</h2>"));
        assert!(html.contains("<h2>Tokens</h2>"));
        assert!(html.contains("<h2>Bytecode</h2>"));
        // The folded constant shows up in the listing
        assert!(html.contains("push, 6"));
        assert!(html.contains("hlt"));
    }

    #[test]
    fn test_source_is_escaped() {
        let source = "using core\nprintln(1 < 2)";
        let buffer = codegen::compile_source("demo.opal", source).unwrap();
        let html = render("demo.opal", source, &buffer).unwrap();
        assert!(html.contains("println(1 &lt; 2)"));
    }
}
