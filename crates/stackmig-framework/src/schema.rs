//! Resource schema definitions

use serde::{Deserialize, Serialize};

/// Schema of a single top-level attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub name: String,
    pub description: String,
    /// Must be supplied by the user
    pub required: bool,
    /// Set by the provider
    pub computed: bool,
    /// A change forces destroy and recreate
    pub replace_on_change: bool,
}

impl AttributeSchema {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
            computed: false,
            replace_on_change: false,
        }
    }

    pub fn computed(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
            computed: true,
            replace_on_change: false,
        }
    }

    pub fn requires_replace(mut self) -> Self {
        self.replace_on_change = true;
        self
    }
}

/// Schema of a resource type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub version: u32,
    pub description: String,
    pub attributes: Vec<AttributeSchema>,
}

impl Schema {
    pub fn v0(description: impl Into<String>) -> Self {
        Self {
            version: 0,
            description: description.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn required_attributes(&self) -> impl Iterator<Item = &AttributeSchema> {
        self.attributes.iter().filter(|a| a.required)
    }
}
