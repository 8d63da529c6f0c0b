//! Call plan: the ordered list of calling conventions to try for an agent.
//!
//! Built once from what the agent declares, so per-request resolution is a
//! walk over a fixed list instead of probing the agent again.

use std::fmt;

use crate::agent::{Agent, Argument, Method};

/// How the user text is shaped for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Text,
    Empty,
    Input,
    TextField,
}

impl Shape {
    /// Shapes tried, in order, on streaming methods.
    pub const STREAMING: [Shape; 4] = [Shape::Text, Shape::Empty, Shape::Input, Shape::TextField];

    pub fn apply(self, text: &str) -> Argument {
        match self {
            Shape::Text => Argument::Text(text.to_string()),
            Shape::Empty => Argument::Empty,
            Shape::Input => Argument::Input(text.to_string()),
            Shape::TextField => Argument::TextField(text.to_string()),
        }
    }
}

/// One planned attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Try each shape in turn; the first that does not fail wins.
    Shapes { method: Method, shapes: Vec<Shape> },
    /// Call with the text; on a shape mismatch retry with `[text]`.
    TextOrBatch { method: Method },
    /// Call with the text only.
    Text { method: Method },
}

impl Step {
    pub fn method(&self) -> &Method {
        match self {
            Step::Shapes { method, .. } | Step::TextOrBatch { method } | Step::Text { method } => method,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Shapes { method, shapes } => write!(f, "{method}({shapes:?})"),
            Step::TextOrBatch { method } => write!(f, "{method}(text|[text])"),
            Step::Text { method } => write!(f, "{method}(text)"),
        }
    }
}

/// Ordered calling conventions for one agent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallPlan {
    steps: Vec<Step>,
}

impl CallPlan {
    /// Build the plan from the agent's declared capabilities.
    ///
    /// Priority, highest first:
    /// 1. streaming methods (`run_async`, `run_live`) with every shape;
    /// 2. conventional methods (`generate` … `run`) with text, then `[text]`;
    /// 3. the agent itself, if callable;
    /// 4. remaining public methods, alphabetically, with text.
    pub fn discover(agent: &dyn Agent) -> Self {
        // `Named("generate")` and `Generate` are the same method.
        let exposed: Vec<Method> = agent.methods().iter().map(|m| Method::from_name(m.name())).collect();
        let mut steps = Vec::new();

        for method in Method::STREAMING {
            if exposed.contains(&method) {
                steps.push(Step::Shapes { method, shapes: Shape::STREAMING.to_vec() });
            }
        }

        for method in Method::CONVENTIONAL {
            if exposed.contains(&method) {
                steps.push(Step::TextOrBatch { method });
            }
        }

        if agent.callable() {
            steps.push(Step::Text { method: Method::Direct });
        }

        // Anything already planned was tried with the bare text above.
        let mut rest: Vec<Method> = exposed
            .into_iter()
            .filter(|m| m.is_public())
            .filter(|m| !steps.iter().any(|s| s.method() == m))
            .collect();
        rest.sort_by(|a, b| a.name().cmp(b.name()));
        rest.dedup();
        steps.extend(rest.into_iter().map(|method| Step::Text { method }));

        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for CallPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str("<none>");
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" > ")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}
