use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const EQUIPMENT_NAME_NOT_AVAILABLE: &str = "Not available";

/// An `Equipment` record from the FitLogEx pre-pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: Option<String>,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub date_purchased: Option<String>,
    pub expected_life_kilometers: Option<String>,
    pub in_use: Option<String>,
    pub notes: Option<String>,
    pub purchase_location: Option<String>,
    pub purchase_price: Option<String>,
    pub kind: Option<String>,
    pub weight_kilograms: Option<String>,
}

impl Equipment {
    /// Explicit name, else "Brand - Model", else the placeholder. An
    /// equipment without brand and model does occur in real exports.
    pub fn display_name(&self) -> String {
        if let Some(name) = non_empty(&self.name) {
            return name.to_string();
        }

        match (non_empty(&self.brand), non_empty(&self.model)) {
            (Some(brand), Some(model)) => format!("{brand} - {model}"),
            (Some(brand), None) => brand.to_string(),
            (None, Some(model)) => model.to_string(),
            (None, None) => EQUIPMENT_NAME_NOT_AVAILABLE.to_string(),
        }
    }

    /// Tag notes listing every populated detail.
    pub fn notes_text(&self) -> String {
        let mut notes = format!("Id(SportTracks): {}", self.id.as_deref().unwrap_or(""));

        let details = [
            ("DatePurchased", &self.date_purchased),
            ("ExpectedLifeKilometers", &self.expected_life_kilometers),
            ("InUse", &self.in_use),
            ("PurchaseLocation", &self.purchase_location),
            ("PurchasePrice", &self.purchase_price),
            ("Type", &self.kind),
            ("WeightKilograms", &self.weight_kilograms),
            ("Notes", &self.notes),
        ];

        for (label, value) in details {
            let Some(value) = non_empty(value) else {
                continue;
            };
            if label == "WeightKilograms" && value == "0.000" {
                continue;
            }
            notes.push('\n');
            notes.push_str(label);
            notes.push_str(": ");
            notes.push_str(value);
        }

        notes
    }

    /// Stores a detail by its FitLogEx element/attribute name. Returns false
    /// for names that are not equipment details.
    pub fn set_field(&mut self, field: &str, value: String) -> bool {
        let slot = match field {
            "Id" => &mut self.id,
            "Name" => &mut self.name,
            "Brand" => &mut self.brand,
            "Model" => &mut self.model,
            "DatePurchased" => &mut self.date_purchased,
            "ExpectedLifeKilometers" => &mut self.expected_life_kilometers,
            "InUse" => &mut self.in_use,
            "Notes" => &mut self.notes,
            "PurchaseLocation" => &mut self.purchase_location,
            "PurchasePrice" => &mut self.purchase_price,
            "Type" => &mut self.kind,
            "WeightKilograms" => &mut self.weight_kilograms,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Custom data field name → number of decimals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomFieldDefinitions {
    decimals: HashMap<String, usize>,
}

impl CustomFieldDefinitions {
    /// Registers a definition from its `Options` string, e.g. `#$x02|2|0`.
    /// Returns the decimals when a rule was stored.
    pub fn define(&mut self, name: &str, options: &str) -> Option<usize> {
        // TRIMP is exported with empty options but is an integer value.
        if name == "TRIMP" && options.is_empty() {
            self.decimals.insert(name.to_string(), 0);
            return Some(0);
        }

        let tokens: Vec<&str> = options.split('|').collect();
        if tokens.len() < 2 {
            return None;
        }

        let decimals = tokens[1].trim().parse::<usize>().ok()?;
        self.decimals.insert(name.to_string(), decimals);
        Some(decimals)
    }

    pub fn decimals(&self, name: &str) -> Option<usize> {
        self.decimals.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.decimals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.decimals.len()
    }
}

/// Immutable hand-off from the pre-pass to the activity pass.
#[derive(Debug, Clone, Default)]
pub struct AuxiliaryData {
    pub field_definitions: CustomFieldDefinitions,
    pub equipment: Vec<Equipment>,
}

impl AuxiliaryData {
    pub fn equipment_by_id(&self, id: &str) -> Option<&Equipment> {
        self.equipment
            .iter()
            .find(|equipment| equipment.id.as_deref() == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_falls_back_to_brand_and_model() {
        let equipment = Equipment {
            brand: Some("Specialized".into()),
            model: Some("Tarmac".into()),
            ..Default::default()
        };
        assert_eq!(equipment.display_name(), "Specialized - Tarmac");

        let model_only = Equipment {
            model: Some("Pegasus".into()),
            ..Default::default()
        };
        assert_eq!(model_only.display_name(), "Pegasus");
    }

    #[test]
    fn unnamed_equipment_gets_placeholder() {
        let equipment = Equipment {
            id: Some("42".into()),
            ..Default::default()
        };
        assert_eq!(equipment.display_name(), EQUIPMENT_NAME_NOT_AVAILABLE);
    }

    #[test]
    fn notes_skip_zero_weight() {
        let equipment = Equipment {
            id: Some("abc".into()),
            in_use: Some("true".into()),
            weight_kilograms: Some("0.000".into()),
            ..Default::default()
        };
        assert_eq!(equipment.notes_text(), "Id(SportTracks): abc\nInUse: true");
    }

    #[test]
    fn trimp_with_empty_options_is_zero_decimals() {
        let mut definitions = CustomFieldDefinitions::default();
        assert_eq!(definitions.define("TRIMP", ""), Some(0));
        assert_eq!(definitions.decimals("TRIMP"), Some(0));
    }

    #[test]
    fn options_without_separator_are_skipped() {
        let mut definitions = CustomFieldDefinitions::default();
        assert_eq!(definitions.define("Effort", ""), None);
        assert_eq!(definitions.define("Effort", "#$x02"), None);
        assert!(definitions.is_empty());

        assert_eq!(definitions.define("cts/mile", "#$x02|2|0"), Some(2));
        assert_eq!(definitions.decimals("cts/mile"), Some(2));
    }
}
