//! Echo backend: replies with the input prefixed by `[echo]`.
//! Used for exercising the full relay path without an API key.

use crate::agent::{Argument, CallError, Method, Outcome, Value};

#[derive(Debug, Clone)]
pub struct EchoAgent;

impl EchoAgent {
    pub fn methods(&self) -> Vec<Method> {
        vec![Method::Generate]
    }

    pub async fn call(&self, method: &Method, arg: Argument) -> Result<Outcome, CallError> {
        match (method, arg) {
            (Method::Generate, Argument::Text(text)) => {
                Ok(Outcome::Ready(Value::Text(format!("[echo] {text}"))))
            }
            (Method::Generate, other) => Err(CallError::Shape(format!(
                "generate takes text, got {}",
                other.shape()
            ))),
            (m, _) => Err(CallError::Unsupported(m.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generate_prefixes_echo() {
        let out = EchoAgent.call(&Method::Generate, Argument::Text("hello".into())).await.unwrap();
        let Outcome::Ready(v) = out else { panic!("expected ready outcome") };
        assert_eq!(v, Value::from("[echo] hello"));
    }

    #[tokio::test]
    async fn batch_is_a_shape_error() {
        let err = EchoAgent
            .call(&Method::Generate, Argument::Batch(vec!["x".into()]))
            .await
            .unwrap_err();
        assert!(err.is_shape());
    }

    #[tokio::test]
    async fn other_methods_unsupported() {
        let err = EchoAgent.call(&Method::Chat, Argument::Text("x".into())).await.unwrap_err();
        assert_eq!(err, CallError::Unsupported("chat".into()));
    }
}
