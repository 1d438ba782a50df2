use serde::{Deserialize, Serialize};

/// How a navigation link opens in the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "_self")]
    SameWindow,
    #[serde(rename = "_blank")]
    NewWindow,
}

impl Target {
    #[must_use]
    pub fn is_external(self) -> bool {
        matches!(self, Self::NewWindow)
    }
}

/// One entry of the sidebar's `items` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationItem {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub parent_id: i64,
    pub order: i64,
    pub target: Target,
}
