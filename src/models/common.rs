use serde::Deserialize;

// Query parameters of the availability endpoint
#[derive(Debug, Deserialize)]
pub struct DateQuery {
    #[serde(default)]
    pub date: Option<String>,
}
