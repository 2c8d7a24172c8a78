//! RGB colours: parsing, HSL conversion and interpolation.

use std::fmt;
use std::str::FromStr;

/// An 8-bit RGBA colour. Alpha defaults to opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Hue in degrees `[0, 360)`, saturation and lightness in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b, a: 255 }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Rgb { a, ..self }
    }

    /// Alpha as a fraction in `[0, 1]`.
    pub fn opacity(&self) -> f64 {
        f64::from(self.a) / 255.0
    }

    /// Look up a CSS colour keyword, case-insensitively.
    pub fn named(name: &str) -> Option<Rgb> {
        let name = name.to_ascii_lowercase();
        NAMED_COLORS
            .binary_search_by(|(key, _)| key.cmp(&name.as_str()))
            .ok()
            .map(|i| {
                let (r, g, b) = NAMED_COLORS[i].1;
                Rgb::new(r, g, b)
            })
    }

    /// Parse `#rgb`, `#rrggbb` or `#aarrggbb`.
    pub fn from_hex(text: &str) -> Option<Rgb> {
        let hex = text.strip_prefix('#')?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            3 => {
                // each digit doubles: #c00 -> #cc0000
                let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|d| d * 17);
                Some(Rgb::new(digit(0)?, digit(1)?, digit(2)?))
            }
            6 => Some(Rgb::new(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Rgb::new(byte(2)?, byte(4)?, byte(6)?).with_alpha(byte(0)?)),
            _ => None,
        }
    }

    /// `#rrggbb`, ignoring alpha.
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_hsl(&self) -> Hsl {
        let r = f64::from(self.r) / 255.0;
        let g = f64::from(self.g) / 255.0;
        let b = f64::from(self.b) / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;

        if max == min {
            return Hsl { h: 0.0, s: 0.0, l };
        }

        let d = max - min;
        let s = if l > 0.5 {
            d / (2.0 - max - min)
        } else {
            d / (max + min)
        };
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };

        Hsl { h: h * 60.0, s, l }
    }

    pub fn from_hsl(hsl: Hsl) -> Rgb {
        let h = hsl.h.rem_euclid(360.0) / 360.0;
        let s = hsl.s.clamp(0.0, 1.0);
        let l = hsl.l.clamp(0.0, 1.0);

        if s == 0.0 {
            let v = channel(l);
            return Rgb::new(v, v, v);
        }

        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        Rgb::new(
            channel(hue_to_rgb(p, q, h + 1.0 / 3.0)),
            channel(hue_to_rgb(p, q, h)),
            channel(hue_to_rgb(p, q, h - 1.0 / 3.0)),
        )
    }

    /// Blend towards `other` in HSL space. `amount` is clamped to `[0, 1]`.
    pub fn interpolate(&self, other: &Rgb, amount: f64) -> Rgb {
        let t = amount.clamp(0.0, 1.0);
        let from = self.to_hsl();
        let to = other.to_hsl();
        let mix = |a: f64, b: f64| a + (b - a) * t;

        let rgb = Rgb::from_hsl(Hsl {
            h: mix(from.h, to.h),
            s: mix(from.s, to.s),
            l: mix(from.l, to.l),
        });
        rgb.with_alpha(mix(f64::from(self.a), f64::from(other.a)).round() as u8)
    }
}

fn hue_to_rgb(p: f64, q: f64, t: f64) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

fn channel(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Clamp a numeric channel to `[0, 255]`.
pub(crate) fn clamp_channel(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Error for text that is neither a hex colour, a keyword nor `rgb()`/`rgba()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid colour {0:?}")]
pub struct InvalidColor(pub String);

impl FromStr for Rgb {
    type Err = InvalidColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.starts_with('#') {
            return Rgb::from_hex(text).ok_or_else(|| InvalidColor(s.to_string()));
        }
        if let Some(args) = functional_args(text, "rgba").or_else(|| functional_args(text, "rgb")) {
            return parse_functional(&args).ok_or_else(|| InvalidColor(s.to_string()));
        }
        Rgb::named(text).ok_or_else(|| InvalidColor(s.to_string()))
    }
}

fn functional_args<'a>(text: &'a str, name: &str) -> Option<Vec<&'a str>> {
    let rest = text.get(..name.len())?;
    if !rest.eq_ignore_ascii_case(name) {
        return None;
    }
    let inner = text[name.len()..]
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')?;
    Some(inner.split(',').map(str::trim).collect())
}

fn parse_functional(args: &[&str]) -> Option<Rgb> {
    let num = |i: usize| args.get(i).and_then(|v| v.parse::<f64>().ok());
    let rgb = Rgb::new(
        clamp_channel(num(0)?),
        clamp_channel(num(1)?),
        clamp_channel(num(2)?),
    );
    match args.len() {
        3 => Some(rgb),
        4 => Some(rgb.with_alpha(channel(num(3)?.clamp(0.0, 1.0)))),
        _ => None,
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "{}", self.hex())
        } else {
            write!(
                f,
                "rgba({}, {}, {}, {:.2})",
                self.r,
                self.g,
                self.b,
                self.opacity()
            )
        }
    }
}

// CSS colour keywords, sorted for binary search.
static NAMED_COLORS: &[(&str, (u8, u8, u8))] = &[
    ("aliceblue", (240, 248, 255)),
    ("antiquewhite", (250, 235, 215)),
    ("aqua", (0, 255, 255)),
    ("aquamarine", (127, 255, 212)),
    ("azure", (240, 255, 255)),
    ("beige", (245, 245, 220)),
    ("bisque", (255, 228, 196)),
    ("black", (0, 0, 0)),
    ("blanchedalmond", (255, 235, 205)),
    ("blue", (0, 0, 255)),
    ("blueviolet", (138, 43, 226)),
    ("brown", (165, 42, 42)),
    ("burlywood", (222, 184, 135)),
    ("cadetblue", (95, 158, 160)),
    ("chartreuse", (127, 255, 0)),
    ("chocolate", (210, 105, 30)),
    ("coral", (255, 127, 80)),
    ("cornflowerblue", (100, 149, 237)),
    ("cornsilk", (255, 248, 220)),
    ("crimson", (220, 20, 60)),
    ("cyan", (0, 255, 255)),
    ("darkblue", (0, 0, 139)),
    ("darkcyan", (0, 139, 139)),
    ("darkgoldenrod", (184, 134, 11)),
    ("darkgray", (169, 169, 169)),
    ("darkgreen", (0, 100, 0)),
    ("darkgrey", (169, 169, 169)),
    ("darkkhaki", (189, 183, 107)),
    ("darkmagenta", (139, 0, 139)),
    ("darkolivegreen", (85, 107, 47)),
    ("darkorange", (255, 140, 0)),
    ("darkorchid", (153, 50, 204)),
    ("darkred", (139, 0, 0)),
    ("darksalmon", (233, 150, 122)),
    ("darkseagreen", (143, 188, 143)),
    ("darkslateblue", (72, 61, 139)),
    ("darkslategray", (47, 79, 79)),
    ("darkslategrey", (47, 79, 79)),
    ("darkturquoise", (0, 206, 209)),
    ("darkviolet", (148, 0, 211)),
    ("deeppink", (255, 20, 147)),
    ("deepskyblue", (0, 191, 255)),
    ("dimgray", (105, 105, 105)),
    ("dimgrey", (105, 105, 105)),
    ("dodgerblue", (30, 144, 255)),
    ("firebrick", (178, 34, 34)),
    ("floralwhite", (255, 250, 240)),
    ("forestgreen", (34, 139, 34)),
    ("fuchsia", (255, 0, 255)),
    ("gainsboro", (220, 220, 220)),
    ("ghostwhite", (248, 248, 255)),
    ("gold", (255, 215, 0)),
    ("goldenrod", (218, 165, 32)),
    ("gray", (128, 128, 128)),
    ("green", (0, 128, 0)),
    ("greenyellow", (173, 255, 47)),
    ("grey", (128, 128, 128)),
    ("honeydew", (240, 255, 240)),
    ("hotpink", (255, 105, 180)),
    ("indianred", (205, 92, 92)),
    ("indigo", (75, 0, 130)),
    ("ivory", (255, 255, 240)),
    ("khaki", (240, 230, 140)),
    ("lavender", (230, 230, 250)),
    ("lavenderblush", (255, 240, 245)),
    ("lawngreen", (124, 252, 0)),
    ("lemonchiffon", (255, 250, 205)),
    ("lightblue", (173, 216, 230)),
    ("lightcoral", (240, 128, 128)),
    ("lightcyan", (224, 255, 255)),
    ("lightgoldenrodyellow", (250, 250, 210)),
    ("lightgray", (211, 211, 211)),
    ("lightgreen", (144, 238, 144)),
    ("lightgrey", (211, 211, 211)),
    ("lightpink", (255, 182, 193)),
    ("lightsalmon", (255, 160, 122)),
    ("lightseagreen", (32, 178, 170)),
    ("lightskyblue", (135, 206, 250)),
    ("lightslategray", (119, 136, 153)),
    ("lightslategrey", (119, 136, 153)),
    ("lightsteelblue", (176, 196, 222)),
    ("lightyellow", (255, 255, 224)),
    ("lime", (0, 255, 0)),
    ("limegreen", (50, 205, 50)),
    ("linen", (250, 240, 230)),
    ("magenta", (255, 0, 255)),
    ("maroon", (128, 0, 0)),
    ("mediumaquamarine", (102, 205, 170)),
    ("mediumblue", (0, 0, 205)),
    ("mediumorchid", (186, 85, 211)),
    ("mediumpurple", (147, 112, 219)),
    ("mediumseagreen", (60, 179, 113)),
    ("mediumslateblue", (123, 104, 238)),
    ("mediumspringgreen", (0, 250, 154)),
    ("mediumturquoise", (72, 209, 204)),
    ("mediumvioletred", (199, 21, 133)),
    ("midnightblue", (25, 25, 112)),
    ("mintcream", (245, 255, 250)),
    ("mistyrose", (255, 228, 225)),
    ("moccasin", (255, 228, 181)),
    ("navajowhite", (255, 222, 173)),
    ("navy", (0, 0, 128)),
    ("oldlace", (253, 245, 230)),
    ("olive", (128, 128, 0)),
    ("olivedrab", (107, 142, 35)),
    ("orange", (255, 165, 0)),
    ("orangered", (255, 69, 0)),
    ("orchid", (218, 112, 214)),
    ("palegoldenrod", (238, 232, 170)),
    ("palegreen", (152, 251, 152)),
    ("paleturquoise", (175, 238, 238)),
    ("palevioletred", (219, 112, 147)),
    ("papayawhip", (255, 239, 213)),
    ("peachpuff", (255, 218, 185)),
    ("peru", (205, 133, 63)),
    ("pink", (255, 192, 203)),
    ("plum", (221, 160, 221)),
    ("powderblue", (176, 224, 230)),
    ("purple", (128, 0, 128)),
    ("rebeccapurple", (102, 51, 153)),
    ("red", (255, 0, 0)),
    ("rosybrown", (188, 143, 143)),
    ("royalblue", (65, 105, 225)),
    ("saddlebrown", (139, 69, 19)),
    ("salmon", (250, 128, 114)),
    ("sandybrown", (244, 164, 96)),
    ("seagreen", (46, 139, 87)),
    ("seashell", (255, 245, 238)),
    ("sienna", (160, 82, 45)),
    ("silver", (192, 192, 192)),
    ("skyblue", (135, 206, 235)),
    ("slateblue", (106, 90, 205)),
    ("slategray", (112, 128, 144)),
    ("slategrey", (112, 128, 144)),
    ("snow", (255, 250, 250)),
    ("springgreen", (0, 255, 127)),
    ("steelblue", (70, 130, 180)),
    ("tan", (210, 180, 140)),
    ("teal", (0, 128, 128)),
    ("thistle", (216, 191, 216)),
    ("tomato", (255, 99, 71)),
    ("turquoise", (64, 224, 208)),
    ("violet", (238, 130, 238)),
    ("wheat", (245, 222, 179)),
    ("white", (255, 255, 255)),
    ("whitesmoke", (245, 245, 245)),
    ("yellow", (255, 255, 0)),
    ("yellowgreen", (154, 205, 50)),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_table_is_sorted() {
        assert!(NAMED_COLORS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_named_lookup() {
        assert_eq!(Rgb::named("red"), Some(Rgb::new(255, 0, 0)));
        assert_eq!(Rgb::named("Yellow"), Some(Rgb::new(255, 255, 0)));
        assert_eq!(Rgb::named("notacolor"), None);
    }

    #[test]
    fn test_short_hex_expands_each_digit() {
        assert_eq!("#c00".parse::<Rgb>().unwrap(), Rgb::new(0xcc, 0, 0));
        assert_eq!("#abc".parse::<Rgb>().unwrap(), Rgb::new(0xaa, 0xbb, 0xcc));
    }

    #[test]
    fn test_long_hex_and_alpha() {
        assert_eq!("#ff8000".parse::<Rgb>().unwrap(), Rgb::new(255, 128, 0));
        let c = "#80ff0000".parse::<Rgb>().unwrap();
        assert_eq!(c, Rgb::new(255, 0, 0).with_alpha(0x80));
        assert!("#12345".parse::<Rgb>().is_err());
        assert!("#zzz".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_functional_notation() {
        assert_eq!("rgb(0, 0, 0)".parse::<Rgb>().unwrap(), Rgb::BLACK);
        let c = "rgba(255,255,255,0.5)".parse::<Rgb>().unwrap();
        assert_eq!(c, Rgb::WHITE.with_alpha(128));
        assert!("rgb(1,2)".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_hsl_round_trip_primaries() {
        for c in [Rgb::new(255, 0, 0), Rgb::new(0, 255, 0), Rgb::new(0, 0, 255)] {
            assert_eq!(Rgb::from_hsl(c.to_hsl()), c);
        }
        let hsl = Rgb::new(255, 0, 0).to_hsl();
        assert_eq!(hsl.h, 0.0);
        assert_eq!(hsl.s, 1.0);
        assert_eq!(hsl.l, 0.5);
    }

    #[test]
    fn test_interpolate_endpoints() {
        let red = Rgb::named("red").unwrap();
        let blue = Rgb::named("blue").unwrap();
        assert_eq!(red.interpolate(&blue, 0.0), red);
        assert_eq!(red.interpolate(&blue, 1.0), blue);
        assert_eq!(red.interpolate(&blue, 7.0), blue);
        // halfway between hue 0 and hue 240 is hue 120
        assert_eq!(red.interpolate(&blue, 0.5), Rgb::new(0, 255, 0));
    }

    #[test]
    fn test_display() {
        assert_eq!(Rgb::new(0xcc, 0, 0).to_string(), "#cc0000");
        assert_eq!(
            Rgb::BLACK.with_alpha(0).to_string(),
            "rgba(0, 0, 0, 0.00)"
        );
    }
}
