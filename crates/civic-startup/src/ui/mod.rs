//! UI-thread plumbing: the message loop, observable collections and
//! cancellable view-model operations.

pub mod collection;
pub mod marshal;
pub mod operation;

pub use collection::{CollectionChange, ObservableCollection};
pub use marshal::{MarshalError, UiDispatcher, UiLoop, UiThread};
pub use operation::{
    ui_progress, AsyncOperation, OperationContext, OperationOutcome, OperationProgress,
    ProgressCallback,
};
