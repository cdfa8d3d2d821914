//! Destination path templates.
//!
//! A template is a format string such as `{name|basename}-{release_name}.gz`.
//! Each `{...}` names a context key optionally followed by `|`-separated
//! filters; `{{` and `}}` are literal braces.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Context keys a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    AssetName,
    AssetNameCleaned,
    Name,
    ReleaseName,
}

impl Key {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "asset_name" => Some(Self::AssetName),
            "asset_name_cleaned" => Some(Self::AssetNameCleaned),
            "name" => Some(Self::Name),
            "release_name" => Some(Self::ReleaseName),
            _ => None,
        }
    }
}

/// Named text transforms applied after key lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Last `/`-separated segment.
    Basename,
    /// Basename up to the first `.`.
    StripExt,
}

impl Filter {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "basename" => Some(Self::Basename),
            "strip_ext" => Some(Self::StripExt),
            _ => None,
        }
    }

    fn apply<'a>(&self, value: &'a str) -> &'a str {
        let base = value.rsplit('/').next().unwrap_or(value);
        match self {
            Self::Basename => base,
            Self::StripExt => base.split('.').next().unwrap_or(base),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field { key: Key, filters: Vec<Filter> },
}

/// Per-member values a template is rendered against.
#[derive(Debug, Clone, Copy)]
pub struct NamingContext<'a> {
    pub asset_name: &'a str,
    pub asset_name_cleaned: &'a str,
    pub name: &'a str,
    pub release_name: &'a str,
}

impl NamingContext<'_> {
    fn get(&self, key: Key) -> &str {
        match key {
            Key::AssetName => self.asset_name,
            Key::AssetNameCleaned => self.asset_name_cleaned,
            Key::Name => self.name,
            Key::ReleaseName => self.release_name,
        }
    }
}

/// A parsed, validated naming template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl NameTemplate {
    /// Parse `template`, rejecting unknown keys and filters and unbalanced braces.
    pub fn parse(template: &str) -> Result<Self> {
        let err = |reason: String| Error::Template {
            template: template.to_owned(),
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(err("single '}' encountered".into())),
                '{' => {
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => return Err(err("unexpected '{' in field".into())),
                            Some(c) => field.push(c),
                            None => return Err(err("unclosed '{'".into())),
                        }
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(parse_field(&field).map_err(err)?);
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_owned(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render against `ctx` and resolve the result under `output_root`.
    pub fn render(&self, ctx: &NamingContext<'_>, output_root: &Path) -> PathBuf {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field { key, filters } => {
                    let value = filters.iter().fold(ctx.get(*key), |v, f| f.apply(v));
                    out.push_str(value);
                }
            }
        }
        output_root.join(out)
    }
}

impl fmt::Display for NameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_field(field: &str) -> std::result::Result<Segment, String> {
    let mut bits = field.split('|').map(str::trim);
    let key_name = bits.next().unwrap_or_default();
    let key = Key::parse(key_name).ok_or_else(|| format!("unknown key {key_name:?}"))?;
    let filters = bits
        .map(|name| Filter::parse(name).ok_or_else(|| format!("unknown filter {name:?}")))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Segment::Field { key, filters })
}
