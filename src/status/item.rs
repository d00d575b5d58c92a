//! Status items and the merge-by-name array.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

// ============================================================================
// Markup
// ============================================================================

/// How the bar renders `full_text`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Markup {
    /// Plain text.
    #[default]
    None,
    /// Pango markup.
    Pango,
}

// ============================================================================
// StatusItem
// ============================================================================

/// One block of the status line.
///
/// `name` identifies the block when merging. Protocol fields without a
/// dedicated member (`short_text`, `separator`, `min_width`, ...) live in
/// `extra` and are serialized inline, in insertion order.
///
/// # Format
///
/// ```json
/// {"name":"cpu","markup":"none","full_text":"5%","color":"#ff0000","urgent":true}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusItem {
    /// Merge key.
    pub name: String,

    /// Text rendering mode; unset is written as `none`.
    #[serde(default, serialize_with = "serialize_markup")]
    pub markup: Option<Markup>,

    /// Displayed text.
    pub full_text: String,

    /// Text colour (`#rrggbb`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Any other protocol field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatusItem {
    /// Creates a plain-text item.
    #[must_use]
    pub fn new(name: impl Into<String>, full_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            markup: None,
            full_text: full_text.into(),
            color: None,
            extra: Map::new(),
        }
    }

    /// Sets the markup mode.
    #[inline]
    #[must_use]
    pub fn with_markup(mut self, markup: Markup) -> Self {
        self.markup = Some(markup);
        self
    }

    /// Sets the colour.
    #[inline]
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Sets an extra protocol field.
    #[inline]
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Overwrites this item's fields with `other`'s.
    ///
    /// Fields `other` leaves unset (`markup`, `color`, absent extras) keep
    /// their current value; existing extras keep their position.
    fn update(&mut self, other: Self) {
        if other.markup.is_some() {
            self.markup = other.markup;
        }
        self.full_text = other.full_text;
        if other.color.is_some() {
            self.color = other.color;
        }
        for (key, value) in other.extra {
            self.extra.insert(key, value);
        }
    }
}

fn serialize_markup<S>(markup: &Option<Markup>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    markup.unwrap_or_default().serialize(serializer)
}

// ============================================================================
// StatusArray
// ============================================================================

/// Ordered status items forming one status-line frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusArray(Vec<StatusItem>);

impl StatusArray {
    /// Creates an empty array.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `item` by name.
    ///
    /// The first item with the same name is updated in place and keeps its
    /// position; otherwise `item` becomes the first element.
    pub fn merge(&mut self, item: StatusItem) {
        match self.0.iter_mut().find(|existing| existing.name == item.name) {
            Some(existing) => existing.update(item),
            None => self.0.insert(0, item),
        }
    }

    /// Returns the item named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StatusItem> {
        self.0.iter().find(|item| item.name == name)
    }

    /// Returns the items in display order.
    #[inline]
    #[must_use]
    pub fn items(&self) -> &[StatusItem] {
        &self.0
    }

    /// Returns the number of items.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the array holds no items.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<StatusItem>> for StatusArray {
    fn from(items: Vec<StatusItem>) -> Self {
        Self(items)
    }
}

// ============================================================================
// Tests
// ============================================================================
