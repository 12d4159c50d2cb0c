use serde::{Deserialize, Serialize};

/// Prefix marking a corrected copy of an attribute
pub const DERIVED_PREFIX: &str = "new_";

/// Marker attribute recording which model produced a correction
pub const CORRECTION_MODEL_FIELD: &str = "second_correction_model";

/// Name of the attribute holding the corrected form of `name`
pub fn derived_name(name: &str) -> String {
    format!("{}{}", DERIVED_PREFIX, name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldShape {
    /// One categorical value per record
    Scalar,
    /// A list of tagged sub-items per record, each with its own category
    List,
}

impl FieldShape {
    /// Operation label used for token accounting
    pub fn operation(&self) -> &'static str {
        match self {
            FieldShape::Scalar => "user_profile_classification",
            FieldShape::List => "product_topic_classification",
        }
    }
}

impl std::fmt::Display for FieldShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldShape::Scalar => write!(f, "scalar"),
            FieldShape::List => write!(f, "list"),
        }
    }
}

/// A scalar user-profile attribute to normalize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarField {
    pub name: String,
    /// Human description of what the categories classify, passed to the proposer
    pub category_type: String,
}

impl ScalarField {
    pub fn new(name: impl Into<String>, category_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category_type: category_type.into(),
        }
    }

    /// Full path of the raw attribute below `root`
    pub fn source_path(&self, root: &str) -> String {
        join_path(root, &self.name)
    }

    /// Full path of the corrected attribute below `root`
    pub fn derived_path(&self, root: &str) -> String {
        join_path(root, &derived_name(&self.name))
    }
}

/// A list-of-tagged-items attribute to normalize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListField {
    /// Path of the list attribute
    #[serde(default = "default_list_path")]
    pub path: String,
    /// Key inside each item holding its raw tag
    #[serde(default = "default_tag_key")]
    pub tag_key: String,
    pub category_type: String,
}

fn default_list_path() -> String {
    "product_topic_result".to_string()
}

fn default_tag_key() -> String {
    "topic".to_string()
}

impl ListField {
    pub fn new(category_type: impl Into<String>) -> Self {
        Self {
            path: default_list_path(),
            tag_key: default_tag_key(),
            category_type: category_type.into(),
        }
    }

    /// Key inside each item that receives the canonical tag
    pub fn derived_key(&self) -> String {
        derived_name(&self.tag_key)
    }

    /// Dotted path reaching every raw tag across the list
    pub fn tag_path(&self) -> String {
        join_path(&self.path, &self.tag_key)
    }
}

fn join_path(root: &str, name: &str) -> String {
    if root.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", root, name)
    }
}

/// The fields one correction run covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfigs {
    /// Parent attribute of the scalar fields
    #[serde(default = "default_profile_root")]
    pub profile_root: String,
    #[serde(default)]
    pub scalar: Vec<ScalarField>,
    #[serde(default)]
    pub list: Option<ListField>,
}

fn default_profile_root() -> String {
    "user_profile".to_string()
}

impl Default for FieldConfigs {
    fn default() -> Self {
        Self {
            profile_root: default_profile_root(),
            scalar: vec![
                ScalarField::new("gender", "性别"),
                ScalarField::new("occupation", "职业"),
                ScalarField::new("consumption_scene", "用户消费场景"),
                ScalarField::new("consumption_frequency", "用户购买情况：首次|二次|多次"),
                ScalarField::new(
                    "consumption_thrill_point",
                    "产品给用户带来的超出预期的即时满足的特点",
                ),
                ScalarField::new("consumption_pain_point", "产品给用户带来的不得不解决的问题"),
                ScalarField::new(
                    "consumption_itch_point",
                    "产品给用户带来的不解决也行，但解决更爽的欲望",
                ),
            ],
            list: Some(ListField::new("扩音器")),
        }
    }
}

impl FieldConfigs {
    pub fn scalar_field(&self, name: &str) -> Option<&ScalarField> {
        self.scalar.iter().find(|f| f.name == name)
    }

    /// Keep only the named scalar field and drop the list field
    pub fn only_scalar(&self, name: &str) -> Option<Self> {
        self.scalar_field(name).map(|field| Self {
            profile_root: self.profile_root.clone(),
            scalar: vec![field.clone()],
            list: None,
        })
    }
}
