//! ElementLocator port - host UI の検索
//!
//! 純粋な lookup のみ。副作用は持たない。
//! セレクタの中身（どの要素が送信ボタンか）は実装側の関心事。

use crate::domain::{ComposeFields, ControlHandle, ExtractionError};

pub trait ElementLocator: Send + Sync {
    /// Send controls currently present in the host page.
    fn send_controls(&self) -> Vec<ControlHandle>;

    /// Compose context owning `control`.
    ///
    /// `Ok(None)` means the control is not inside a compose surface right now.
    fn compose_fields(
        &self,
        control: &ControlHandle,
    ) -> Result<Option<ComposeFields>, ExtractionError>;
}
