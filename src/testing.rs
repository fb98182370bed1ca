//! Document types used across the crate's tests.

use serde::{Deserialize, Serialize};

use crate::conventions::{Attachments, Document, Identity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub description: Option<String>,
    #[serde(skip)]
    pub script_module: Option<String>,
}

impl Project {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            script_module: None,
        }
    }
}

impl Document for Project {
    const PATH_TEMPLATE: &'static str = "projects/{id}/project.json";
    const ATTACHMENTS: &'static [&'static str] = &["readme.md", "module.psm1"];

    fn identity(&self) -> Identity {
        Identity::from(&self.id)
    }

    fn assign_identity(&mut self, identity: Identity) {
        self.id = identity.to_string();
    }

    fn write_attachments(&self, attachments: &mut Attachments) {
        if let Some(description) = &self.description {
            attachments.insert_text("readme.md", description);
        }
        if let Some(module) = &self.script_module {
            attachments.insert_text("module.psm1", module);
        }
    }

    fn read_attachments(&mut self, attachments: &Attachments) {
        self.description = attachments.text("readme.md");
        self.script_module = attachments.text("module.psm1");
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentProcess {
    pub id: String,
    pub steps: Vec<String>,
}

impl Document for DeploymentProcess {
    const PATH_TEMPLATE: &'static str = "projects/{id}/process.json";

    fn identity(&self) -> Identity {
        Identity::from(&self.id)
    }

    fn assign_identity(&mut self, identity: Identity) {
        self.id = identity.to_string();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSet {
    pub id: String,
    pub variables: Vec<(String, String)>,
}

impl Document for VariableSet {
    const PATH_TEMPLATE: &'static str = "projects/{id}/variables.json";

    fn identity(&self) -> Identity {
        Identity::from(&self.id)
    }

    fn assign_identity(&mut self, identity: Identity) {
        self.id = identity.to_string();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentEnvironment {
    pub id: String,
    pub name: String,
}

impl DeploymentEnvironment {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

impl Document for DeploymentEnvironment {
    const PATH_TEMPLATE: &'static str = "environments/{id}.json";

    fn identity(&self) -> Identity {
        Identity::from(&self.id)
    }

    fn assign_identity(&mut self, identity: Identity) {
        self.id = identity.to_string();
    }
}

/// Numbered by the identity allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: u64,
    pub name: String,
}

impl Machine {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

impl Document for Machine {
    const PATH_TEMPLATE: &'static str = "machines/{id}.json";

    fn identity(&self) -> Identity {
        Identity::from(self.id)
    }

    fn assign_identity(&mut self, identity: Identity) {
        self.id = identity.as_u64().unwrap_or_default();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptModule {
    pub id: String,
    pub body: String,
}

impl Document for ScriptModule {
    const PATH_TEMPLATE: &'static str = "library/script-modules/{id}/module.json";

    fn identity(&self) -> Identity {
        Identity::from(&self.id)
    }

    fn assign_identity(&mut self, identity: Identity) {
        self.id = identity.to_string();
    }
}
