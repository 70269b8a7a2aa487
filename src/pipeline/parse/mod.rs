pub mod accumulate;
pub mod fitlog;
pub mod prepass;

use std::borrow::Cow;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    FitLog,
    /// Superset variant carrying equipment and custom field definitions.
    FitLogEx,
}

impl FileFormat {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit('.').next()?.to_lowercase();
        match ext.as_str() {
            "fitlog" => Some(FileFormat::FitLog),
            "fitlogex" => Some(FileFormat::FitLogEx),
            _ => None,
        }
    }

    pub fn has_auxiliary_data(self) -> bool {
        matches!(self, FileFormat::FitLogEx)
    }
}

/// Attributes of one element, in document order.
#[derive(Debug, Default)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn push(&mut self, key: &str, value: &str) {
        self.entries.push((key.to_string(), value.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value with surrounding whitespace removed, `None` when absent or blank.
    pub fn get_content(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn parse_f64(&self, key: &str) -> Option<f64> {
        self.get_content(key)?.parse().ok()
    }

    pub fn parse_f32(&self, key: &str) -> Option<f32> {
        self.get_content(key)?.parse().ok()
    }

    /// Decimal attributes are truncated, absent or invalid values become 0.
    pub fn parse_int_or_zero(&self, key: &str) -> i32 {
        self.parse_f64(key).map(|v| v as i32).unwrap_or(0)
    }

    pub fn parse_f32_or_zero(&self, key: &str) -> f32 {
        self.parse_f32(key).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Receives element and character events in document order.
pub trait XmlHandler {
    fn start_element(&mut self, name: &str, attributes: &Attributes) -> Result<(), ParseError>;
    fn characters(&mut self, text: &str);
    fn end_element(&mut self, name: &str) -> Result<(), ParseError>;
}

/// Streams `bytes` through `handler`. An empty element produces a start and
/// an end event.
pub fn visit<H: XmlHandler>(bytes: &[u8], handler: &mut H) -> Result<(), ParseError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = element_name(e.name().as_ref())?;
                let attributes = read_attributes(&e)?;
                handler.start_element(&name, &attributes)?;
            }
            Ok(Event::Empty(e)) => {
                let name = element_name(e.name().as_ref())?;
                let attributes = read_attributes(&e)?;
                handler.start_element(&name, &attributes)?;
                handler.end_element(&name)?;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| ParseError::InvalidXml(e.to_string()))?;
                handler.characters(&text);
            }
            Ok(Event::CData(e)) => {
                let bytes = e.into_inner();
                let text = std::str::from_utf8(&bytes)
                    .map_err(|e| ParseError::InvalidXml(e.to_string()))?;
                handler.characters(text);
            }
            Ok(Event::End(e)) => {
                let name = element_name(e.name().as_ref())?;
                handler.end_element(&name)?;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::InvalidXml(format!(
                    "{} at byte {}",
                    e,
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn element_name(raw: &[u8]) -> Result<String, ParseError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| ParseError::InvalidXml(e.to_string()))
}

fn read_attributes(e: &quick_xml::events::BytesStart) -> Result<Attributes, ParseError> {
    let mut attributes = Attributes::default();

    for attr in e.attributes() {
        let attr = attr.map_err(|e| ParseError::InvalidXml(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| ParseError::InvalidXml(e.to_string()))?;
        let value: Cow<str> = attr
            .unescape_value()
            .map_err(|e| ParseError::InvalidXml(e.to_string()))?;
        attributes.push(key, &value);
    }

    Ok(attributes)
}
