use std::any::Any;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TaskError {
    Panic(String),
    QueueClosed,
}

impl TaskError {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic".to_owned()
        };
        TaskError::Panic(message)
    }
}
