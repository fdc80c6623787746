/// Gate for destructive actions. Returning `false` cancels the action.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Accepts every prompt, for `--yes` and scripted use.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        tracing::debug!(prompt, "auto-confirmed");
        true
    }
}
