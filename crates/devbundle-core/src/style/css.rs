//! Minification and vendor prefixing using lightningcss.

use super::StyleError;
use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

/// CSS output options.
#[derive(Debug, Clone, Default)]
pub struct CssOptions {
    /// Enable minification.
    pub minify: bool,
    /// Enable autoprefixer with browser targets.
    pub autoprefixer: bool,
    /// Source file path (for error messages).
    pub filename: Option<String>,
    /// Browser targets for autoprefixer (defaults to reasonable coverage).
    pub targets: Option<Browsers>,
}

/// Run the final CSS pass over already-inlined source.
pub fn process_css(source: &str, options: &CssOptions) -> Result<String, StyleError> {
    let filename = options.filename.as_deref().unwrap_or("input.css");

    let parser_options = ParserOptions {
        filename: filename.to_string(),
        ..ParserOptions::default()
    };
    let mut stylesheet = StyleSheet::parse(source, parser_options)
        .map_err(|e| StyleError::Css(format!("parse error in {filename}: {e}")))?;

    let targets = if options.autoprefixer {
        options.targets.unwrap_or_else(default_browser_targets)
    } else {
        Browsers::default()
    };

    // Minify also applies the prefixing transforms
    if options.minify || options.autoprefixer {
        stylesheet
            .minify(MinifyOptions {
                targets: Targets::from(targets),
                ..Default::default()
            })
            .map_err(|e| StyleError::Css(format!("minify error in {filename}: {e}")))?;
    }

    let printer_options = PrinterOptions {
        minify: options.minify,
        targets: Targets::from(targets),
        ..Default::default()
    };

    let output = stylesheet
        .to_css(printer_options)
        .map_err(|e| StyleError::Css(format!("print error in {filename}: {e}")))?;

    Ok(output.code)
}

/// Chrome 80+, Firefox 75+, Safari 13+, Edge 80+.
fn default_browser_targets() -> Browsers {
    Browsers {
        chrome: Some(80 << 16),
        firefox: Some(75 << 16),
        safari: Some(13 << 16),
        edge: Some(80 << 16),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let code = process_css(".foo { color: red; }", &CssOptions::default()).unwrap();
        assert!(code.contains("color"));
    }

    #[test]
    fn test_minification() {
        let options = CssOptions {
            minify: true,
            ..Default::default()
        };
        let code = process_css(".foo {\n  color: red;\n  margin: 10px;\n}", &options).unwrap();
        assert!(!code.contains('\n'));
    }

    #[test]
    fn test_autoprefixer_keeps_declarations() {
        let options = CssOptions {
            autoprefixer: true,
            ..Default::default()
        };
        let code = process_css(".foo { display: flex; }", &options).unwrap();
        assert!(code.contains("flex"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let options = CssOptions {
            filename: Some("broken.css".to_string()),
            ..Default::default()
        };
        let err = process_css(".foo { color: red; ", &options);
        if let Err(StyleError::Css(message)) = err {
            assert!(message.contains("broken.css"));
        }
    }
}
