//! First pass over a FitLogEx file: custom field formats and equipment, which
//! may appear anywhere in the document.

use crate::error::ParseError;
use crate::pipeline::parse::{visit, Attributes, XmlHandler};
use crate::types::equipment::{AuxiliaryData, CustomFieldDefinitions, Equipment};

const TAG_CUSTOM_DATA_FIELD_DEFINITION: &str = "CustomDataFieldDefinition";
const TAG_EQUIPMENT: &str = "Equipment";
const ATTRIB_NAME: &str = "Name";
const ATTRIB_OPTIONS: &str = "Options";

pub fn parse_auxiliary(bytes: &[u8]) -> Result<AuxiliaryData, ParseError> {
    let mut handler = PrePassHandler::default();
    visit(bytes, &mut handler)?;

    tracing::debug!(
        "Pre-pass found {} custom field formats and {} equipment records",
        handler.definitions.len(),
        handler.equipment.len()
    );

    Ok(AuxiliaryData {
        field_definitions: handler.definitions,
        equipment: handler.equipment,
    })
}

#[derive(Default)]
struct PrePassHandler {
    definitions: CustomFieldDefinitions,
    equipment: Vec<Equipment>,
    /// Indices into `equipment` of the currently open `Equipment` elements.
    open_equipment: Vec<usize>,
    /// Equipment detail element whose text is being collected.
    field: Option<String>,
    characters: String,
}

impl XmlHandler for PrePassHandler {
    fn start_element(&mut self, name: &str, attributes: &Attributes) -> Result<(), ParseError> {
        match name {
            TAG_CUSTOM_DATA_FIELD_DEFINITION => {
                let field_name = attributes.get(ATTRIB_NAME).unwrap_or_default();
                let options = attributes.get(ATTRIB_OPTIONS).unwrap_or_default();

                if !field_name.is_empty() && self.definitions.define(field_name, options).is_none() {
                    tracing::debug!("Unknown format '{}' for custom field '{}'", options, field_name);
                }
            }
            TAG_EQUIPMENT => {
                let mut equipment = Equipment::default();
                for (key, value) in attributes.iter() {
                    if !value.trim().is_empty() {
                        equipment.set_field(key, value.to_string());
                    }
                }

                self.open_equipment.push(self.equipment.len());
                self.equipment.push(equipment);
                self.field = None;
            }
            _ if !self.open_equipment.is_empty() => {
                self.field = Some(name.to_string());
                self.characters.clear();
            }
            _ => {}
        }

        Ok(())
    }

    fn characters(&mut self, text: &str) {
        if self.field.is_some() {
            self.characters.push_str(text);
        }
    }

    fn end_element(&mut self, name: &str) -> Result<(), ParseError> {
        if name == TAG_EQUIPMENT {
            self.open_equipment.pop();
            self.field = None;
            return Ok(());
        }

        if self.field.as_deref() != Some(name) {
            return Ok(());
        }
        self.field = None;

        let value = self.characters.trim();
        if value.is_empty() {
            return Ok(());
        }

        // innermost open equipment receives the detail
        if let Some(&index) = self.open_equipment.last() {
            self.equipment[index].set_field(name, value.to_string());
        }

        Ok(())
    }
}
