use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Which prompt, if any, currently owns the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    /// `keyword | https://target-url`
    AddKeyword,
    TargetUrl,
    Search,
    FocusArea,
    ConfirmDelete,
}

impl InputMode {
    pub fn title(&self) -> &'static str {
        match self {
            InputMode::Normal => "",
            InputMode::AddKeyword => " Add Keyword (keyword | url) ",
            InputMode::TargetUrl => " Target URL (empty to clear) ",
            InputMode::Search => " Search Keywords ",
            InputMode::FocusArea => " Suggest Keywords: focus area (optional) ",
            InputMode::ConfirmDelete => " Delete keyword? (y/n) ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    Quit,
    MoveUp,
    MoveDown,
    MoveToTop,
    MoveToBottom,
    Select,
    AnalyzeAll,
    CancelAnalyses,
    AddKeyword,
    EditTargetUrl,
    CyclePriority,
    CycleContentStatus,
    IncreaseFocus,
    DecreaseFocus,
    DeleteKeyword,
    CycleFilter,
    Search,
    ShowTrending,
    SuggestKeywords,
    ShowKeywords,
    OpenInBrowser,
    ShowHelp,
    HideHelp,
    // Prompt actions
    InputChar(char),
    InputBackspace,
    InputConfirm,
    InputCancel,
}

pub fn handle_key_event(key: KeyEvent, input_mode: InputMode, show_help: bool) -> Option<AppAction> {
    // If help is showing, any key closes it
    if show_help {
        return Some(AppAction::HideHelp);
    }

    match input_mode {
        InputMode::Normal => {}
        InputMode::ConfirmDelete => {
            return match key.code {
                KeyCode::Char(c) => Some(AppAction::InputChar(c)),
                _ => Some(AppAction::InputCancel),
            };
        }
        _ => {
            return match key.code {
                KeyCode::Enter => Some(AppAction::InputConfirm),
                KeyCode::Esc => Some(AppAction::InputCancel),
                KeyCode::Backspace => Some(AppAction::InputBackspace),
                KeyCode::Char(c) => Some(AppAction::InputChar(c)),
                _ => None,
            };
        }
    }

    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), _) => Some(AppAction::Quit),
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(AppAction::Quit),

        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(AppAction::MoveDown),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(AppAction::MoveUp),
        (KeyCode::Char('<'), _) => Some(AppAction::MoveToTop),
        (KeyCode::Char('>'), _) => Some(AppAction::MoveToBottom),

        (KeyCode::Enter, _) => Some(AppAction::Select),
        (KeyCode::Esc, _) => Some(AppAction::CancelAnalyses),
        (KeyCode::Tab, _) => Some(AppAction::ShowKeywords),

        (KeyCode::Char('A'), _) => Some(AppAction::AnalyzeAll),
        (KeyCode::Char('a'), _) => Some(AppAction::AddKeyword),
        (KeyCode::Char('u'), _) => Some(AppAction::EditTargetUrl),
        (KeyCode::Char('p'), _) => Some(AppAction::CyclePriority),
        (KeyCode::Char('s'), _) => Some(AppAction::CycleContentStatus),
        (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => Some(AppAction::IncreaseFocus),
        (KeyCode::Char('-'), _) => Some(AppAction::DecreaseFocus),
        (KeyCode::Char('d'), _) => Some(AppAction::DeleteKeyword),
        (KeyCode::Char('f'), _) => Some(AppAction::CycleFilter),
        (KeyCode::Char('/'), _) => Some(AppAction::Search),
        (KeyCode::Char('t'), _) => Some(AppAction::ShowTrending),
        (KeyCode::Char('g'), _) => Some(AppAction::SuggestKeywords),
        (KeyCode::Char('o'), _) => Some(AppAction::OpenInBrowser),

        (KeyCode::Char('?'), _) => Some(AppAction::ShowHelp),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_normal_mode_bindings() {
        let normal = |code| handle_key_event(key(code), InputMode::Normal, false);
        assert_eq!(normal(KeyCode::Char('j')), Some(AppAction::MoveDown));
        assert_eq!(normal(KeyCode::Enter), Some(AppAction::Select));
        assert_eq!(normal(KeyCode::Char('A')), Some(AppAction::AnalyzeAll));
        assert_eq!(normal(KeyCode::Char('a')), Some(AppAction::AddKeyword));
        assert_eq!(normal(KeyCode::Esc), Some(AppAction::CancelAnalyses));
        assert_eq!(normal(KeyCode::Char('x')), None);
    }

    #[test]
    fn test_prompt_captures_keys() {
        let action = handle_key_event(key(KeyCode::Char('q')), InputMode::Search, false);
        assert_eq!(action, Some(AppAction::InputChar('q')));
        let action = handle_key_event(key(KeyCode::Esc), InputMode::AddKeyword, false);
        assert_eq!(action, Some(AppAction::InputCancel));
    }

    #[test]
    fn test_confirm_delete_cancels_on_non_char() {
        let action = handle_key_event(key(KeyCode::Esc), InputMode::ConfirmDelete, false);
        assert_eq!(action, Some(AppAction::InputCancel));
        let action = handle_key_event(key(KeyCode::Char('y')), InputMode::ConfirmDelete, false);
        assert_eq!(action, Some(AppAction::InputChar('y')));
    }

    #[test]
    fn test_help_swallows_next_key() {
        let action = handle_key_event(key(KeyCode::Char('q')), InputMode::Normal, true);
        assert_eq!(action, Some(AppAction::HideHelp));
    }
}
