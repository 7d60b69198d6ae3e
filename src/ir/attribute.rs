//! Typed attribute values, properties and components.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{MapIoError, Result};

/// Two-component float vector
pub type Float2 = [f32; 2];

/// Attribute name to value, iterated in name order
pub type AttributeMap = BTreeMap<String, Attribute>;

/// Reference to an object by its persistent id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectRef(pub i32);

/// RGBA color with 8-bit channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
    /// Alpha channel
    pub a: u8,
}

impl Default for Color {
    fn default() -> Self {
        Self::rgba(0, 0, 0, 0xFF)
    }
}

impl Color {
    /// Create color from channels
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    fn parse_channels(hex: &str) -> Option<Vec<u8>> {
        let digits = hex.strip_prefix('#')?;
        if !digits.is_ascii() || !(digits.len() == 6 || digits.len() == 8) {
            return None;
        }
        (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
            .collect()
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA`
    pub fn from_rgba(hex: &str) -> Option<Self> {
        match Self::parse_channels(hex)?.as_slice() {
            &[r, g, b] => Some(Self::rgba(r, g, b, 0xFF)),
            &[r, g, b, a] => Some(Self::rgba(r, g, b, a)),
            _ => None,
        }
    }

    /// Parse `#RRGGBB` or `#AARRGGBB`
    pub fn from_argb(hex: &str) -> Option<Self> {
        match Self::parse_channels(hex)?.as_slice() {
            &[r, g, b] => Some(Self::rgba(r, g, b, 0xFF)),
            &[a, r, g, b] => Some(Self::rgba(r, g, b, a)),
            _ => None,
        }
    }

    /// Format as `#RRGGBBAA`
    pub fn to_rgba(&self) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }

    /// Format as `#AARRGGBB`
    pub fn to_argb(&self) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", self.a, self.r, self.g, self.b)
    }

    /// Channels normalized to `0.0..=1.0`
    pub fn normalized(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a].map(|c| f32::from(c) / 255.0)
    }
}

/// Type tag of an [`Attribute`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// UTF-8 string
    String,
    /// 32-bit integer
    Int,
    /// Two integers
    Int2,
    /// Three integers
    Int3,
    /// Four integers
    Int4,
    /// 32-bit float
    Float,
    /// Two floats
    Float2,
    /// Three floats
    Float3,
    /// Four floats
    Float4,
    /// Boolean
    Bool,
    /// File path
    Path,
    /// RGBA color
    Color,
    /// Object reference
    Object,
}

impl AttributeType {
    /// Type tag as written by the native format
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Int => "int",
            AttributeType::Int2 => "int2",
            AttributeType::Int3 => "int3",
            AttributeType::Int4 => "int4",
            AttributeType::Float => "float",
            AttributeType::Float2 => "float2",
            AttributeType::Float3 => "float3",
            AttributeType::Float4 => "float4",
            AttributeType::Bool => "bool",
            AttributeType::Path => "path",
            AttributeType::Color => "color",
            AttributeType::Object => "object",
        }
    }

    /// True for the int2..int4 and float2..float4 types
    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            AttributeType::Int2
                | AttributeType::Int3
                | AttributeType::Int4
                | AttributeType::Float2
                | AttributeType::Float3
                | AttributeType::Float4
        )
    }

    /// Default value of this type
    pub fn default_value(&self) -> Attribute {
        match self {
            AttributeType::String => Attribute::String(String::new()),
            AttributeType::Int => Attribute::Int(0),
            AttributeType::Int2 => Attribute::Int2([0; 2]),
            AttributeType::Int3 => Attribute::Int3([0; 3]),
            AttributeType::Int4 => Attribute::Int4([0; 4]),
            AttributeType::Float => Attribute::Float(0.0),
            AttributeType::Float2 => Attribute::Float2([0.0; 2]),
            AttributeType::Float3 => Attribute::Float3([0.0; 3]),
            AttributeType::Float4 => Attribute::Float4([0.0; 4]),
            AttributeType::Bool => Attribute::Bool(false),
            AttributeType::Path => Attribute::Path(PathBuf::new()),
            AttributeType::Color => Attribute::Color(Color::default()),
            AttributeType::Object => Attribute::Object(ObjectRef::default()),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeType {
    type Err = MapIoError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "string" => AttributeType::String,
            "int" => AttributeType::Int,
            "int2" => AttributeType::Int2,
            "int3" => AttributeType::Int3,
            "int4" => AttributeType::Int4,
            "float" => AttributeType::Float,
            "float2" => AttributeType::Float2,
            "float3" => AttributeType::Float3,
            "float4" => AttributeType::Float4,
            "bool" => AttributeType::Bool,
            "path" | "file" => AttributeType::Path,
            "color" => AttributeType::Color,
            "object" => AttributeType::Object,
            other => return Err(MapIoError::unsupported("property type", other)),
        })
    }
}

/// A typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// UTF-8 string
    String(String),
    /// 32-bit integer
    Int(i32),
    /// Two integers
    Int2([i32; 2]),
    /// Three integers
    Int3([i32; 3]),
    /// Four integers
    Int4([i32; 4]),
    /// 32-bit float
    Float(f32),
    /// Two floats
    Float2([f32; 2]),
    /// Three floats
    Float3([f32; 3]),
    /// Four floats
    Float4([f32; 4]),
    /// Boolean
    Bool(bool),
    /// File path
    Path(PathBuf),
    /// RGBA color
    Color(Color),
    /// Object reference
    Object(ObjectRef),
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

fn split_vector<T: FromStr, const N: usize>(text: &str) -> Option<[T; N]> {
    let parts = text
        .split(';')
        .map(|part| part.trim().parse::<T>().ok())
        .collect::<Option<Vec<T>>>()?;
    parts.try_into().ok()
}

impl Attribute {
    /// Type tag of this value
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            Attribute::String(_) => AttributeType::String,
            Attribute::Int(_) => AttributeType::Int,
            Attribute::Int2(_) => AttributeType::Int2,
            Attribute::Int3(_) => AttributeType::Int3,
            Attribute::Int4(_) => AttributeType::Int4,
            Attribute::Float(_) => AttributeType::Float,
            Attribute::Float2(_) => AttributeType::Float2,
            Attribute::Float3(_) => AttributeType::Float3,
            Attribute::Float4(_) => AttributeType::Float4,
            Attribute::Bool(_) => AttributeType::Bool,
            Attribute::Path(_) => AttributeType::Path,
            Attribute::Color(_) => AttributeType::Color,
            Attribute::Object(_) => AttributeType::Object,
        }
    }

    /// True if the value has its type's default value
    pub fn is_default(&self) -> bool {
        *self == self.attribute_type().default_value()
    }

    /// Textual form used wherever a value is stored as a string.
    ///
    /// Vectors are `;` separated, colors are `#RRGGBBAA`, paths use forward
    /// slashes.
    pub fn to_text(&self) -> String {
        match self {
            Attribute::String(s) => s.clone(),
            Attribute::Int(v) => v.to_string(),
            Attribute::Int2(v) => join(v),
            Attribute::Int3(v) => join(v),
            Attribute::Int4(v) => join(v),
            Attribute::Float(v) => v.to_string(),
            Attribute::Float2(v) => join(v),
            Attribute::Float3(v) => join(v),
            Attribute::Float4(v) => join(v),
            Attribute::Bool(v) => v.to_string(),
            Attribute::Path(p) => path_to_text(p),
            Attribute::Color(c) => c.to_rgba(),
            Attribute::Object(o) => o.0.to_string(),
        }
    }

    /// Parse the textual form produced by [`Attribute::to_text`].
    pub fn from_text(ty: AttributeType, text: &str) -> Result<Self> {
        let corrupt = || MapIoError::invalid(format!("{ty} property"), format!("'{text}'"));

        Ok(match ty {
            AttributeType::String => Attribute::String(text.to_string()),
            AttributeType::Int => Attribute::Int(text.trim().parse().map_err(|_| corrupt())?),
            AttributeType::Int2 => Attribute::Int2(split_vector(text).ok_or_else(corrupt)?),
            AttributeType::Int3 => Attribute::Int3(split_vector(text).ok_or_else(corrupt)?),
            AttributeType::Int4 => Attribute::Int4(split_vector(text).ok_or_else(corrupt)?),
            AttributeType::Float => {
                Attribute::Float(text.trim().parse().map_err(|_| corrupt())?)
            },
            AttributeType::Float2 => Attribute::Float2(split_vector(text).ok_or_else(corrupt)?),
            AttributeType::Float3 => Attribute::Float3(split_vector(text).ok_or_else(corrupt)?),
            AttributeType::Float4 => Attribute::Float4(split_vector(text).ok_or_else(corrupt)?),
            AttributeType::Bool => match text.trim() {
                "true" | "1" => Attribute::Bool(true),
                "false" | "0" => Attribute::Bool(false),
                _ => return Err(corrupt()),
            },
            AttributeType::Path => Attribute::Path(PathBuf::from(text)),
            AttributeType::Color => Attribute::Color(Color::from_rgba(text).ok_or_else(corrupt)?),
            AttributeType::Object => {
                Attribute::Object(ObjectRef(text.trim().parse().map_err(|_| corrupt())?))
            },
        })
    }
}

/// Widen a float to the `f64` with the same shortest decimal form, so
/// `0.1f32` is written as `0.1` and not `0.10000000149011612`.
pub fn widen(value: f32) -> f64 {
    value.to_string().parse().unwrap_or_else(|_| f64::from(value))
}

/// Render a path with forward slashes on every platform.
pub fn path_to_text(path: &std::path::Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Name, properties and attached components shared by every IR node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    /// Display name
    pub name: String,
    /// Typed properties
    pub properties: AttributeMap,
    /// Attached component instances keyed by component name
    pub components: BTreeMap<String, AttributeMap>,
}

impl Metadata {
    /// Metadata with only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a property, builder style
    pub fn with_property(mut self, name: impl Into<String>, value: Attribute) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Attach a component instance cloned from its definition template
    pub fn attach_component(&mut self, name: impl Into<String>, template: &AttributeMap) {
        self.components.insert(name.into(), template.clone());
    }

    /// True if there are no properties and no components
    pub fn is_bare(&self) -> bool {
        self.properties.is_empty() && self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_formats() {
        let color = Color::rgba(0x11, 0x22, 0x33, 0x44);
        assert_eq!(color.to_rgba(), "#11223344");
        assert_eq!(color.to_argb(), "#44112233");
        assert_eq!(Color::from_rgba("#11223344"), Some(color));
        assert_eq!(Color::from_argb("#44112233"), Some(color));
        assert_eq!(Color::from_rgba("#112233"), Some(Color::rgba(0x11, 0x22, 0x33, 0xFF)));
        assert_eq!(Color::from_rgba("112233"), None);
        assert_eq!(Color::from_rgba("#11223"), None);
    }

    #[test]
    fn test_vector_text() {
        let value = Attribute::Float3([0.5, 1.0, -2.25]);
        assert_eq!(value.to_text(), "0.5;1;-2.25");
        assert_eq!(
            Attribute::from_text(AttributeType::Float3, "0.5;1;-2.25").unwrap(),
            value
        );
        assert!(Attribute::from_text(AttributeType::Int2, "1;2;3").is_err());
        assert!(Attribute::from_text(AttributeType::Int2, "1;x").is_err());
    }

    #[test]
    fn test_type_tags() {
        for tag in [
            "string", "int", "int2", "int3", "int4", "float", "float2", "float3", "float4",
            "bool", "path", "color", "object",
        ] {
            let ty: AttributeType = tag.parse().unwrap();
            assert_eq!(ty.as_str(), tag);
        }
        assert!(matches!(
            "matrix".parse::<AttributeType>(),
            Err(MapIoError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn test_defaults() {
        assert!(Attribute::Int(0).is_default());
        assert!(!Attribute::Bool(true).is_default());
        assert!(AttributeType::Color.default_value().is_default());
    }

    #[test]
    fn test_attach_component_clones_template() {
        let mut template = AttributeMap::new();
        template.insert("hp".to_string(), Attribute::Int(10));

        let mut meta = Metadata::named("player");
        meta.attach_component("Health", &template);
        template.insert("hp".to_string(), Attribute::Int(99));

        assert_eq!(meta.components["Health"]["hp"], Attribute::Int(10));
    }
}
