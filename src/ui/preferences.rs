use iced::{
    widget::{button, column, row, scrollable, text, text_input, toggler, Column},
    Alignment, Element, Length,
};

use crate::{config::Preferences, domain::Catalog};

/// Editing state of the preferences panel.
pub struct PreferencesView {
    pub interval_input: String,
}

#[derive(Debug, Clone)]
pub enum PreferencesMessage {
    VisibilityToggled(String, bool),
    MoveUp(String),
    MoveDown(String),
    IntervalChanged(String),
    IntervalSubmitted,
    ClosePressed,
}

impl PreferencesView {
    pub fn new(preferences: &Preferences) -> Self {
        Self {
            interval_input: preferences.refresh_interval.to_string(),
        }
    }

    /// Interval typed by the user, in seconds.
    pub fn interval(&self) -> Option<u64> {
        self.interval_input.trim().parse().ok()
    }

    pub fn update(&mut self, message: PreferencesMessage) {
        if let PreferencesMessage::IntervalChanged(value) = message {
            self.interval_input = value;
        }
    }

    pub fn view<'a>(
        &'a self,
        preferences: &Preferences,
        catalog: &'a Catalog,
    ) -> Element<'a, PreferencesMessage> {
        let interval = row![
            text("Refresh interval (seconds)").size(14).width(Length::Fill),
            text_input("900", &self.interval_input)
                .on_input(PreferencesMessage::IntervalChanged)
                .on_submit(PreferencesMessage::IntervalSubmitted)
                .width(Length::Fixed(80.0)),
        ]
        .spacing(10)
        .align_y(Alignment::Center);

        let entries = preferences.entries(catalog);
        let last = entries.len().saturating_sub(1);

        let rows = entries.into_iter().enumerate().filter_map(|(index, entry)| {
            let descriptor = catalog.get(&entry.id)?;
            let id = descriptor.id.clone();

            let line: Element<'a, PreferencesMessage> = row![
                toggler(entry.display)
                    .label(descriptor.title.as_str())
                    .on_toggle({
                        let id = id.clone();
                        move |display| PreferencesMessage::VisibilityToggled(id.clone(), display)
                    })
                    .width(Length::Fill),
                button("Up")
                    .on_press_maybe((index > 0).then(|| PreferencesMessage::MoveUp(id.clone())))
                    .padding([4, 10]),
                button("Down")
                    .on_press_maybe((index < last).then(|| PreferencesMessage::MoveDown(id)))
                    .padding([4, 10]),
            ]
            .spacing(10)
            .align_y(Alignment::Center)
            .into();
            Some(line)
        });

        column![
            row![
                text("Preferences").size(24).width(Length::Fill),
                button("Done")
                    .on_press(PreferencesMessage::ClosePressed)
                    .padding([10, 20]),
            ]
            .align_y(Alignment::Center),
            interval,
            scrollable(Column::with_children(rows).spacing(6)).height(Length::Fixed(320.0)),
        ]
        .padding(20)
        .spacing(10)
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_input() {
        let prefs = Preferences::defaults().unwrap();
        let mut view = PreferencesView::new(&prefs);
        assert_eq!(view.interval(), Some(900));

        view.update(PreferencesMessage::IntervalChanged(" 120 ".into()));
        assert_eq!(view.interval(), Some(120));

        view.update(PreferencesMessage::IntervalChanged("soon".into()));
        assert_eq!(view.interval(), None);
    }
}
