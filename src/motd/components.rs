use std::fmt;

/// A formatting code.
///
/// See [Formatting codes](https://minecraft.wiki/w/Formatting_codes#Formatting_codes).
/// Strikethrough and underline have no effect on Bedrock clients, which the
/// parser does not take into account.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Formatting {
    Bold,
    Italic,
    Underlined,
    Strikethrough,
    Obfuscated,
    Reset,
}

impl Formatting {
    pub const ALL: [Self; 6] = [
        Self::Bold,
        Self::Italic,
        Self::Underlined,
        Self::Strikethrough,
        Self::Obfuscated,
        Self::Reset,
    ];

    /// The character following `§` for this code.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Bold => 'l',
            Self::Italic => 'o',
            Self::Underlined => 'n',
            Self::Strikethrough => 'm',
            Self::Obfuscated => 'k',
            Self::Reset => 'r',
        }
    }

    /// Looks a code up, ignoring case.
    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        let code = code.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.code() == code)
    }

    /// The key of this style in a JSON chat component.
    #[must_use]
    pub const fn json_key(self) -> &'static str {
        match self {
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::Underlined => "underlined",
            Self::Strikethrough => "strikethrough",
            Self::Obfuscated => "obfuscated",
            Self::Reset => "reset",
        }
    }
}

/// One of the sixteen palette colors, plus Bedrock's minecoin gold.
///
/// See [Color codes](https://minecraft.wiki/w/Formatting_codes#Color_codes).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MinecraftColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkAqua,
    DarkRed,
    DarkPurple,
    Gold,
    Gray,
    DarkGray,
    Blue,
    Green,
    Aqua,
    Red,
    LightPurple,
    Yellow,
    White,
    /// Only understood by Bedrock clients.
    MinecoinGold,
}

impl MinecraftColor {
    pub const ALL: [Self; 17] = [
        Self::Black,
        Self::DarkBlue,
        Self::DarkGreen,
        Self::DarkAqua,
        Self::DarkRed,
        Self::DarkPurple,
        Self::Gold,
        Self::Gray,
        Self::DarkGray,
        Self::Blue,
        Self::Green,
        Self::Aqua,
        Self::Red,
        Self::LightPurple,
        Self::Yellow,
        Self::White,
        Self::MinecoinGold,
    ];

    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Black => '0',
            Self::DarkBlue => '1',
            Self::DarkGreen => '2',
            Self::DarkAqua => '3',
            Self::DarkRed => '4',
            Self::DarkPurple => '5',
            Self::Gold => '6',
            Self::Gray => '7',
            Self::DarkGray => '8',
            Self::Blue => '9',
            Self::Green => 'a',
            Self::Aqua => 'b',
            Self::Red => 'c',
            Self::LightPurple => 'd',
            Self::Yellow => 'e',
            Self::White => 'f',
            Self::MinecoinGold => 'g',
        }
    }

    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        let code = code.to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// The name used for this color in JSON chat components.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Black => "black",
            Self::DarkBlue => "dark_blue",
            Self::DarkGreen => "dark_green",
            Self::DarkAqua => "dark_aqua",
            Self::DarkRed => "dark_red",
            Self::DarkPurple => "dark_purple",
            Self::Gold => "gold",
            Self::Gray => "gray",
            Self::DarkGray => "dark_gray",
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Aqua => "aqua",
            Self::Red => "red",
            Self::LightPurple => "light_purple",
            Self::Yellow => "yellow",
            Self::White => "white",
            Self::MinecoinGold => "minecoin_gold",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Foreground color as rendered by the client.
    #[must_use]
    pub const fn rgb(self) -> [u8; 3] {
        match self {
            Self::Black => [0, 0, 0],
            Self::DarkBlue => [0, 0, 170],
            Self::DarkGreen => [0, 170, 0],
            Self::DarkAqua => [0, 170, 170],
            Self::DarkRed => [170, 0, 0],
            Self::DarkPurple => [170, 0, 170],
            Self::Gold => [255, 170, 0],
            Self::Gray => [170, 170, 170],
            Self::DarkGray => [85, 85, 85],
            Self::Blue => [85, 85, 255],
            Self::Green => [85, 255, 85],
            Self::Aqua => [85, 255, 255],
            Self::Red => [255, 85, 85],
            Self::LightPurple => [255, 85, 255],
            Self::Yellow => [255, 255, 85],
            Self::White => [255, 255, 255],
            Self::MinecoinGold => [221, 214, 5],
        }
    }

    /// Text shadow color. Java and Bedrock disagree only on gold.
    #[must_use]
    pub const fn shadow_rgb(self, bedrock: bool) -> [u8; 3] {
        match self {
            Self::Black => [0, 0, 0],
            Self::DarkBlue => [0, 0, 42],
            Self::DarkGreen => [0, 42, 0],
            Self::DarkAqua => [0, 42, 42],
            Self::DarkRed => [42, 0, 0],
            Self::DarkPurple => [42, 0, 42],
            Self::Gold if bedrock => [64, 42, 0],
            Self::Gold => [42, 42, 0],
            Self::Gray => [42, 42, 42],
            Self::DarkGray => [21, 21, 21],
            Self::Blue => [21, 21, 63],
            Self::Green => [21, 63, 21],
            Self::Aqua => [21, 63, 63],
            Self::Red => [63, 21, 21],
            Self::LightPurple => [63, 21, 63],
            Self::Yellow => [63, 63, 21],
            Self::White => [63, 63, 63],
            Self::MinecoinGold => [55, 53, 1],
        }
    }
}

/// An arbitrary RGB color, used by servers for gradients (1.16+).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct WebColor {
    pub rgb: [u8; 3],
}

impl WebColor {
    #[must_use]
    pub const fn from_rgb(rgb: [u8; 3]) -> Self {
        Self { rgb }
    }

    /// Parses `#rrggbb` or `#rgb`; the leading `#` is optional.
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let expanded: String = match hex.len() {
            6 => hex.to_string(),
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
        Some(Self {
            rgb: [channel(0)?, channel(2)?, channel(4)?],
        })
    }

    /// Lowercase `#rrggbb`.
    #[must_use]
    pub fn hex(&self) -> String {
        let [r, g, b] = self.rgb;
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

/// A `translate` key from a JSON chat component. Transformers render nothing
/// for it.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TranslationTag {
    pub id: String,
}

/// One element of a parsed MOTD.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum MotdComponent {
    Text(String),
    Formatting(Formatting),
    Color(MinecraftColor),
    WebColor(WebColor),
    Translation(TranslationTag),
}

impl MotdComponent {
    pub(crate) const fn is_color(&self) -> bool {
        matches!(self, Self::Color(_) | Self::WebColor(_))
    }

    pub(crate) const fn is_style_or_color(&self) -> bool {
        matches!(self, Self::Color(_) | Self::WebColor(_) | Self::Formatting(_))
    }
}

impl From<&str> for MotdComponent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Formatting> for MotdComponent {
    fn from(formatting: Formatting) -> Self {
        Self::Formatting(formatting)
    }
}

impl From<MinecraftColor> for MotdComponent {
    fn from(color: MinecraftColor) -> Self {
        Self::Color(color)
    }
}

impl From<WebColor> for MotdComponent {
    fn from(color: WebColor) -> Self {
        Self::WebColor(color)
    }
}

impl fmt::Display for Formatting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "§{}", self.code())
    }
}

impl fmt::Display for MinecraftColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "§{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_case_insensitive() {
        assert_eq!(Formatting::from_code('L'), Some(Formatting::Bold));
        assert_eq!(MinecraftColor::from_code('A'), Some(MinecraftColor::Green));
        assert_eq!(MinecraftColor::from_code('z'), None);
    }

    #[test]
    fn names() {
        assert_eq!(
            MinecraftColor::from_name("LIGHT_PURPLE"),
            Some(MinecraftColor::LightPurple)
        );
        assert_eq!(MinecraftColor::from_name("orange"), None);
    }

    #[test]
    fn web_colors() {
        assert_eq!(WebColor::from_hex("#ff8000").unwrap().rgb, [255, 128, 0]);
        assert_eq!(WebColor::from_hex("#f80").unwrap().rgb, [255, 136, 0]);
        assert_eq!(WebColor::from_hex("abcdef").unwrap().hex(), "#abcdef");
        assert_eq!(WebColor::from_hex("#FFF").unwrap().hex(), "#ffffff");
        assert!(WebColor::from_hex("#ff80").is_none());
        assert!(WebColor::from_hex("#gggggg").is_none());
        assert!(WebColor::from_hex("#ééé").is_none());
    }

    #[test]
    fn gold_shadow_differs_per_edition() {
        assert_eq!(MinecraftColor::Gold.shadow_rgb(false), [42, 42, 0]);
        assert_eq!(MinecraftColor::Gold.shadow_rgb(true), [64, 42, 0]);
        assert_eq!(MinecraftColor::Blue.shadow_rgb(true), [21, 21, 63]);
    }
}
