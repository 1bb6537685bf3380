//! Renderers from parsed components to text.
//!
//! A [`Transformer`] implements one hook per component kind; the provided
//! [`Transformer::transform`] walks the components and calls them. Before
//! every palette color a [`Formatting::Reset`] is fed to the hooks, matching
//! how the client clears styles when a color code appears.

use std::fmt::Write;

use super::{Formatting, MinecraftColor, MotdComponent, TranslationTag, WebColor};

pub trait Transformer {
    fn text(&mut self, out: &mut String, text: &str);

    fn formatting(&mut self, _out: &mut String, _formatting: Formatting) {}

    fn color(&mut self, _out: &mut String, _color: MinecraftColor) {}

    fn web_color(&mut self, _out: &mut String, _color: WebColor) {}

    fn translation(&mut self, _out: &mut String, _tag: &TranslationTag) {}

    /// Whether a reset is emitted before each palette color.
    fn reset_before_color(&self) -> bool {
        true
    }

    fn begin(&mut self, _out: &mut String) {}

    fn finish(&mut self, _out: &mut String) {}

    fn transform(&mut self, components: &[MotdComponent]) -> String {
        let mut out = String::new();
        self.begin(&mut out);
        for component in components {
            match component {
                MotdComponent::Text(text) => self.text(&mut out, text),
                MotdComponent::Formatting(formatting) => self.formatting(&mut out, *formatting),
                MotdComponent::Color(color) => {
                    if self.reset_before_color() {
                        self.formatting(&mut out, Formatting::Reset);
                    }
                    self.color(&mut out, *color);
                }
                MotdComponent::WebColor(color) => self.web_color(&mut out, *color),
                MotdComponent::Translation(tag) => self.translation(&mut out, tag),
            }
        }
        self.finish(&mut out);
        out
    }
}

/// Text only.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTransformer;

impl Transformer for PlainTransformer {
    fn text(&mut self, out: &mut String, text: &str) {
        out.push_str(text);
    }
}

/// Canonical `§` codes.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinecraftTransformer;

impl Transformer for MinecraftTransformer {
    fn text(&mut self, out: &mut String, text: &str) {
        out.push_str(text);
    }

    fn formatting(&mut self, out: &mut String, formatting: Formatting) {
        out.push('§');
        out.push(formatting.code());
    }

    fn color(&mut self, out: &mut String, color: MinecraftColor) {
        out.push('§');
        out.push(color.code());
    }

    fn web_color(&mut self, out: &mut String, color: WebColor) {
        out.push('§');
        out.push_str(&color.hex());
    }

    fn reset_before_color(&self) -> bool {
        false
    }
}

/// An HTML `<p>` with inline styles.
#[derive(Debug, Default, Clone)]
pub struct HtmlTransformer {
    bedrock: bool,
    /// Closing tags for everything currently open, outermost first.
    open: Vec<&'static str>,
}

impl HtmlTransformer {
    /// `bedrock` selects the Bedrock text shadow palette.
    #[must_use]
    pub const fn new(bedrock: bool) -> Self {
        Self {
            bedrock,
            open: Vec::new(),
        }
    }

    fn close_all(&mut self, out: &mut String) {
        while let Some(tag) = self.open.pop() {
            out.push_str(tag);
        }
    }
}

fn css_rgb([r, g, b]: [u8; 3]) -> String {
    format!("rgb({r}, {g}, {b})")
}

impl Transformer for HtmlTransformer {
    fn text(&mut self, out: &mut String, text: &str) {
        for c in text.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#x27;"),
                '\n' => out.push_str("<br>"),
                c => out.push(c),
            }
        }
    }

    fn formatting(&mut self, out: &mut String, formatting: Formatting) {
        let (open, close) = match formatting {
            Formatting::Reset => return self.close_all(out),
            Formatting::Obfuscated => ("<span class=obfuscated>", "</span>"),
            Formatting::Bold => ("<b>", "</b>"),
            Formatting::Italic => ("<i>", "</i>"),
            Formatting::Underlined => ("<u>", "</u>"),
            Formatting::Strikethrough => ("<s>", "</s>"),
        };
        out.push_str(open);
        self.open.push(close);
    }

    fn color(&mut self, out: &mut String, color: MinecraftColor) {
        let _ = write!(
            out,
            "<span style='color:{};text-shadow:0 0 1px {}'>",
            css_rgb(color.rgb()),
            css_rgb(color.shadow_rgb(self.bedrock)),
        );
        self.open.push("</span>");
    }

    fn web_color(&mut self, out: &mut String, color: WebColor) {
        self.close_all(out);
        let _ = write!(out, "<span style='color:{}'>", css_rgb(color.rgb));
        self.open.push("</span>");
    }

    fn begin(&mut self, out: &mut String) {
        self.open.clear();
        out.push_str("<p>");
    }

    fn finish(&mut self, out: &mut String) {
        self.close_all(out);
        out.push_str("</p>");
    }
}

/// 24-bit ANSI terminal escapes.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnsiTransformer;

const ANSI_RESET: &str = "\x1b[0m";

fn ansi_rgb(out: &mut String, [r, g, b]: [u8; 3]) {
    let _ = write!(out, "\x1b[38;2;{r};{g};{b}m");
}

impl Transformer for AnsiTransformer {
    fn text(&mut self, out: &mut String, text: &str) {
        out.push_str(text);
    }

    fn formatting(&mut self, out: &mut String, formatting: Formatting) {
        out.push_str(match formatting {
            Formatting::Reset => ANSI_RESET,
            Formatting::Bold => "\x1b[1m",
            Formatting::Italic => "\x1b[3m",
            Formatting::Underlined => "\x1b[4m",
            Formatting::Obfuscated => "\x1b[5m",
            Formatting::Strikethrough => "\x1b[9m",
        });
    }

    fn color(&mut self, out: &mut String, color: MinecraftColor) {
        ansi_rgb(out, color.rgb());
    }

    fn web_color(&mut self, out: &mut String, color: WebColor) {
        ansi_rgb(out, color.rgb);
    }

    fn begin(&mut self, out: &mut String) {
        out.push_str(ANSI_RESET);
    }

    fn finish(&mut self, out: &mut String) {
        out.push_str(ANSI_RESET);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motd::Motd;

    #[test]
    fn plain_drops_everything_but_text() {
        let motd = Motd::parse("§aA §lB§r§#ff0000C", false);
        assert_eq!(motd.to_plain(), "A BC");
    }

    #[test]
    fn minecraft_has_no_injected_resets() {
        let motd = Motd::parse("§lbold§cred", false);
        assert_eq!(motd.to_minecraft(), "§lbold§cred");
    }

    #[test]
    fn html_palette_colors_carry_a_shadow() {
        assert_eq!(
            Motd::parse("§6gold", false).to_html(),
            "<p><span style='color:rgb(255, 170, 0);text-shadow:0 0 1px rgb(42, 42, 0)'>gold</span></p>"
        );
        assert_eq!(
            Motd::parse("§6gold", true).to_html(),
            "<p><span style='color:rgb(255, 170, 0);text-shadow:0 0 1px rgb(64, 42, 0)'>gold</span></p>"
        );
        assert_eq!(
            Motd::parse("§gcoin", true).to_html(),
            "<p><span style='color:rgb(221, 214, 5);text-shadow:0 0 1px rgb(55, 53, 1)'>coin</span></p>"
        );
    }

    #[test]
    fn html_closes_innermost_first() {
        assert_eq!(
            Motd::parse("§1§lA§oB§rC", false).to_html(),
            "<p><span style='color:rgb(0, 0, 170);text-shadow:0 0 1px rgb(0, 0, 42)'>\
             <b>A<i>B</i></b></span>C</p>"
        );
    }

    #[test]
    fn html_color_change_closes_previous_tags() {
        assert_eq!(
            Motd::parse("§ka§0b", false).to_html(),
            "<p><span class=obfuscated>a</span>\
             <span style='color:rgb(0, 0, 0);text-shadow:0 0 1px rgb(0, 0, 0)'>b</span></p>"
        );
        assert_eq!(
            Motd::parse("§#ff0000x§#00ff00y", false).to_html(),
            "<p><span style='color:rgb(255, 0, 0)'>x</span><span style='color:rgb(0, 255, 0)'>y</span></p>"
        );
    }

    #[test]
    fn html_escapes_text_and_breaks_lines() {
        assert_eq!(
            Motd::parse("<b>&\"x'\nline", false).to_html(),
            "<p>&lt;b&gt;&amp;&quot;x&#x27;<br>line</p>"
        );
    }

    #[test]
    fn html_transformer_can_be_reused() {
        let mut html = HtmlTransformer::new(false);
        let parsed = Motd::parse("§lA", false).parsed;
        assert_eq!(html.transform(&parsed), "<p><b>A</b></p>");
        assert_eq!(html.transform(&parsed), "<p><b>A</b></p>");
    }

    #[test]
    fn ansi() {
        assert_eq!(
            Motd::parse("§cred §lbold§rplain", false).to_ansi(),
            "\x1b[0m\x1b[0m\x1b[38;2;255;85;85mred \x1b[1mbold\x1b[0mplain\x1b[0m"
        );
        assert_eq!(
            Motd::parse("§#0a0b0c§k§m§n§ox", false).to_ansi(),
            "\x1b[0m\x1b[38;2;10;11;12m\x1b[5m\x1b[9m\x1b[4m\x1b[3mx\x1b[0m"
        );
    }

    #[test]
    fn translation_tags_render_nothing() {
        let motd = Motd::from_json(&serde_json::json!({"translate": "a.b"}), false);
        assert_eq!(motd.to_plain(), "");
        assert_eq!(motd.to_minecraft(), "§r");
        assert_eq!(motd.to_html(), "<p></p>");
        assert_eq!(motd.to_ansi(), "\x1b[0m\x1b[0m\x1b[0m");
    }
}
