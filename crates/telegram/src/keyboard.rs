use serde::Serialize;

use crate::tokens::CallbackToken;

/// One inline button. `callback_data` always carries an encoded
/// [`CallbackToken`]; free-text buttons do not exist in this bot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, token: CallbackToken) -> Self {
        Self { text: label.into(), callback_data: token.encode() }
    }
}

/// Serializes to the Bot API `InlineKeyboardMarkup` shape: a grid of rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

pub struct KeyboardBuilder {
    rows: Vec<Vec<InlineButton>>,
}

impl KeyboardBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn row<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut RowBuilder),
    {
        let mut builder = RowBuilder::default();
        build(&mut builder);
        if !builder.buttons.is_empty() {
            self.rows.push(builder.buttons);
        }
        self
    }

    /// One button per row, one row per item. The common layout for menus.
    pub fn stacked<I, T, F>(mut self, items: I, mut to_button: F) -> Self
    where
        I: IntoIterator<Item = T>,
        F: FnMut(T) -> InlineButton,
    {
        for item in items {
            self.rows.push(vec![to_button(item)]);
        }
        self
    }

    pub fn build(self) -> InlineKeyboard {
        InlineKeyboard { inline_keyboard: self.rows }
    }
}

impl Default for KeyboardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct RowBuilder {
    buttons: Vec<InlineButton>,
}

impl RowBuilder {
    pub fn button(&mut self, label: impl Into<String>, token: CallbackToken) -> &mut Self {
        self.buttons.push(InlineButton::new(label, token));
        self
    }
}

#[cfg(test)]
mod tests {
    use orderkato_core::domain::AreaId;
    use orderkato_core::flow::CartAction;

    use super::KeyboardBuilder;
    use crate::tokens::CallbackToken;

    #[test]
    fn serializes_to_the_bot_api_markup_shape() {
        let keyboard = KeyboardBuilder::new()
            .stacked([AreaId(1), AreaId(2)], |id| {
                super::InlineButton::new(format!("Area {}", id.0), CallbackToken::Area(id))
            })
            .row(|row| {
                row.button("Cancel", CallbackToken::Action(CartAction::Cancel));
            })
            .build();

        let json = serde_json::to_value(&keyboard).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "inline_keyboard": [
                    [{"text": "Area 1", "callback_data": "area:1"}],
                    [{"text": "Area 2", "callback_data": "area:2"}],
                    [{"text": "Cancel", "callback_data": "action:cancel"}],
                ]
            }),
        );
    }

    #[test]
    fn empty_rows_are_dropped() {
        let keyboard = KeyboardBuilder::new().row(|_| {}).build();
        assert!(keyboard.inline_keyboard.is_empty());
    }
}
