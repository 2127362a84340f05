//! Declarative workflow DAG engine: a typed step DAG
//! (`AgentStep`/`ToolStep`/`ForEach`/`DoUntil`/`DoWhile`) whose dependencies
//! are declared with `After(...)` rather than drawn as edges, compiled once
//! into a validated execution order. Construction-time validation (missing
//! predicate, unreachable step, cycle, duplicate name) happens up front so
//! a malformed workflow never starts running.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::agent::LlmAgent;
use crate::error::{Result, WorkflowError};
use crate::tools::{Tool, ToolCallContext};
use crate::types::AgentTask;

/// Accumulated outputs of previously-run steps, available to later steps'
/// task/argument closures and predicates.
#[derive(Clone, Default)]
pub struct WorkflowContext {
    outputs: HashMap<String, Value>,
    /// Set by a `ForEach` body while iterating: the current item.
    pub current_item: Option<Value>,
    /// Set by a `ForEach` body while iterating: the current item's index.
    pub current_index: Option<usize>,
}

impl WorkflowContext {
    pub fn get(&self, step_name: &str) -> Option<&Value> {
        self.outputs.get(step_name)
    }
}

pub type TaskFn = Arc<dyn Fn(&WorkflowContext) -> AgentTask + Send + Sync>;
pub type ArgsFn = Arc<dyn Fn(&WorkflowContext) -> Value + Send + Sync>;
pub type PredicateFn = Arc<dyn Fn(&WorkflowContext) -> bool + Send + Sync>;

pub enum StepBody {
    AgentStep { agent: Arc<LlmAgent>, task: TaskFn },
    ToolStep { tool: Arc<dyn Tool>, args: ArgsFn },
    ForEach { iter_over: Option<String>, concurrency: usize, body: Box<Step> },
    DoUntil { body: Box<Step>, until: Option<PredicateFn>, max_iter: Option<usize> },
    DoWhile { body: Box<Step>, while_true: Option<PredicateFn>, max_iter: Option<usize> },
}

pub struct Step {
    pub name: String,
    pub body: StepBody,
    /// Names of steps that must complete before this one starts.
    pub after: Vec<String>,
}

impl Step {
    pub fn agent(name: impl Into<String>, agent: Arc<LlmAgent>, task: TaskFn) -> Self {
        Self {
            name: name.into(),
            body: StepBody::AgentStep { agent, task },
            after: Vec::new(),
        }
    }

    pub fn tool(name: impl Into<String>, tool: Arc<dyn Tool>, args: ArgsFn) -> Self {
        Self {
            name: name.into(),
            body: StepBody::ToolStep { tool, args },
            after: Vec::new(),
        }
    }

    pub fn for_each(name: impl Into<String>, body: Step) -> Self {
        Self {
            name: name.into(),
            body: StepBody::ForEach {
                iter_over: None,
                concurrency: 1,
                body: Box::new(body),
            },
            after: Vec::new(),
        }
    }

    pub fn do_until(name: impl Into<String>, body: Step) -> Self {
        Self {
            name: name.into(),
            body: StepBody::DoUntil {
                body: Box::new(body),
                until: None,
                max_iter: None,
            },
            after: Vec::new(),
        }
    }

    pub fn do_while(name: impl Into<String>, body: Step) -> Self {
        Self {
            name: name.into(),
            body: StepBody::DoWhile {
                body: Box::new(body),
                while_true: None,
                max_iter: None,
            },
            after: Vec::new(),
        }
    }

    pub fn after(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.after = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn iter_over(mut self, key: impl Into<String>) -> Self {
        if let StepBody::ForEach { iter_over, .. } = &mut self.body {
            *iter_over = Some(key.into());
        }
        self
    }

    /// Bounds how many iterations of a `ForEach` body run concurrently.
    /// Clamped to at least 1. Default 1 (strictly sequential).
    pub fn concurrency(mut self, n: usize) -> Self {
        if let StepBody::ForEach { concurrency, .. } = &mut self.body {
            *concurrency = n.max(1);
        }
        self
    }

    pub fn until(mut self, predicate: PredicateFn) -> Self {
        if let StepBody::DoUntil { until, .. } = &mut self.body {
            *until = Some(predicate);
        }
        self
    }

    pub fn while_true(mut self, predicate: PredicateFn) -> Self {
        if let StepBody::DoWhile { while_true, .. } = &mut self.body {
            *while_true = Some(predicate);
        }
        self
    }

    /// Caps the number of iterations a `DoUntil`/`DoWhile` body may run
    /// before the loop is aborted as a typed error, guarding against a
    /// predicate that never settles. Required at compile time for both.
    pub fn max_iter(mut self, n: usize) -> Self {
        match &mut self.body {
            StepBody::DoUntil { max_iter, .. } => *max_iter = Some(n),
            StepBody::DoWhile { max_iter, .. } => *max_iter = Some(n),
            _ => {}
        }
        self
    }
}

/// An uncompiled workflow: steps plus their dependency declarations.
#[derive(Default)]
pub struct Workflow {
    steps: Vec<Step>,
    /// Maximum steps running concurrently once their dependencies are met.
    pub max_concurrency: usize,
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            max_concurrency: 4,
        }
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn add_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Validates step names, dependency references, required loop/iteration
    /// options, and reachability; builds the execution order.
    pub fn compile(self) -> std::result::Result<CompiledWorkflow, WorkflowError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.clone()) {
                return Err(WorkflowError::DuplicateStep(step.name.clone()));
            }
            validate_body(&step.name, &step.body)?;
        }

        let names: HashSet<&str> = self.steps.iter().map(|s| s.name.as_str()).collect();
        for step in &self.steps {
            for dep in &step.after {
                if !names.contains(dep.as_str()) {
                    return Err(WorkflowError::UnresolvedInput(step.name.clone()));
                }
            }
        }

        let order = topological_order(&self.steps)?;

        Ok(CompiledWorkflow {
            steps: self.steps,
            order,
            max_concurrency: self.max_concurrency,
        })
    }
}

fn validate_body(name: &str, body: &StepBody) -> std::result::Result<(), WorkflowError> {
    match body {
        StepBody::ForEach { iter_over, body, .. } => {
            if iter_over.is_none() {
                return Err(WorkflowError::MissingIterOver(name.to_string()));
            }
            validate_body(&body.name, &body.body)
        }
        StepBody::DoUntil { until, max_iter, body } => {
            if until.is_none() {
                return Err(WorkflowError::MissingUntilPredicate(name.to_string()));
            }
            if max_iter.is_none() {
                return Err(WorkflowError::MissingMaxIter(name.to_string()));
            }
            validate_body(&body.name, &body.body)
        }
        StepBody::DoWhile { while_true, max_iter, body } => {
            if while_true.is_none() {
                return Err(WorkflowError::MissingWhilePredicate(name.to_string()));
            }
            if max_iter.is_none() {
                return Err(WorkflowError::MissingMaxIter(name.to_string()));
            }
            validate_body(&body.name, &body.body)
        }
        StepBody::AgentStep { .. } | StepBody::ToolStep { .. } => Ok(()),
    }
}

/// Kahn's-algorithm layering: each layer is the set of not-yet-run steps
/// whose dependencies are all satisfied by earlier layers. Layers run
/// sequentially; steps within a layer run concurrently (bounded by
/// `max_concurrency`). A step left out of every layer once the queue empties
/// indicates a cycle.
fn topological_order(steps: &[Step]) -> std::result::Result<Vec<Vec<String>>, WorkflowError> {
    let mut remaining: HashMap<&str, &Step> = steps.iter().map(|s| (s.name.as_str(), s)).collect();
    let mut layers = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<String> = remaining
            .values()
            .filter(|s| s.after.iter().all(|dep| !remaining.contains_key(dep.as_str())))
            .map(|s| s.name.clone())
            .collect();

        if ready.is_empty() {
            let stuck = remaining.keys().next().map(|s| s.to_string()).unwrap_or_default();
            return Err(WorkflowError::Cycle(stuck));
        }

        for name in &ready {
            remaining.remove(name.as_str());
        }
        layers.push(ready);
    }

    Ok(layers)
}

/// A validated, ready-to-run workflow.
pub struct CompiledWorkflow {
    steps: Vec<Step>,
    order: Vec<Vec<String>>,
    max_concurrency: usize,
}

impl CompiledWorkflow {
    /// Runs every layer in order; within a layer, steps run concurrently
    /// bounded by `max_concurrency`. Returns the accumulated
    /// `WorkflowContext` with every step's output keyed by name.
    pub async fn run(&self, cancel: CancellationToken) -> Result<WorkflowContext> {
        let steps_by_name: HashMap<&str, &Step> =
            self.steps.iter().map(|s| (s.name.as_str(), s)).collect();
        let mut ctx = WorkflowContext::default();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        for layer in &self.order {
            let mut handles = Vec::with_capacity(layer.len());
            for name in layer {
                let step = steps_by_name[name.as_str()];
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                let ctx_snapshot = ctx.clone();
                let cancel = cancel.clone();
                handles.push(async move {
                    let _permit = permit;
                    let output = run_step(step, &ctx_snapshot, &cancel).await?;
                    Result::Ok((step.name.clone(), output))
                });
            }
            let results = futures::future::join_all(handles).await;
            for result in results {
                let (name, output) = result?;
                ctx.outputs.insert(name, output);
            }
        }

        Ok(ctx)
    }
}

fn run_step<'a>(
    step: &'a Step,
    ctx: &'a WorkflowContext,
    cancel: &'a CancellationToken,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value>> + Send + 'a>> {
    Box::pin(async move {
        match &step.body {
            StepBody::AgentStep { agent, task } => {
                let result = agent.run(task(ctx), None, cancel.clone()).await?;
                Ok(serde_json::to_value(result).unwrap_or(Value::Null))
            }
            StepBody::ToolStep { tool, args } => {
                let tool_ctx = ToolCallContext::default();
                let result = tool.call(args(ctx), &tool_ctx).await;
                Ok(serde_json::to_value(result).unwrap_or(Value::Null))
            }
            StepBody::ForEach { iter_over, concurrency, body } => {
                let key = iter_over.as_ref().expect("validated at compile time");
                let items = ctx
                    .get(key)
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();
                let semaphore = Arc::new(Semaphore::new((*concurrency).max(1)));
                let mut handles = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let mut child_ctx = ctx.clone();
                    child_ctx.current_item = Some(item);
                    child_ctx.current_index = Some(index);
                    let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                    handles.push(async move {
                        let _permit = permit;
                        let output = run_step(body, &child_ctx, cancel).await?;
                        Result::Ok((index, output))
                    });
                }
                let results = futures::future::join_all(handles).await;
                let mut outputs = vec![Value::Null; results.len()];
                for result in results {
                    let (index, value) = result?;
                    outputs[index] = value;
                }
                Ok(Value::Array(outputs))
            }
            StepBody::DoUntil { body, until, max_iter } => {
                let predicate = until.as_ref().expect("validated at compile time");
                let cap = max_iter.expect("validated at compile time");
                let mut child_ctx = ctx.clone();
                let mut last = Value::Null;
                let mut iterations = 0usize;
                loop {
                    last = run_step(body, &child_ctx, cancel).await?;
                    child_ctx.outputs.insert(body.name.clone(), last.clone());
                    iterations += 1;
                    if predicate(&child_ctx) {
                        break;
                    }
                    if iterations >= cap {
                        return Err(WorkflowError::MaxIterExceeded(body.name.clone(), cap).into());
                    }
                }
                Ok(last)
            }
            StepBody::DoWhile { body, while_true, max_iter } => {
                let predicate = while_true.as_ref().expect("validated at compile time");
                let cap = max_iter.expect("validated at compile time");
                let mut child_ctx = ctx.clone();
                let mut last = Value::Null;
                let mut iterations = 0usize;
                while predicate(&child_ctx) {
                    if iterations >= cap {
                        return Err(WorkflowError::MaxIterExceeded(body.name.clone(), cap).into());
                    }
                    last = run_step(body, &child_ctx, cancel).await?;
                    child_ctx.outputs.insert(body.name.clone(), last.clone());
                    iterations += 1;
                }
                Ok(last)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentCore;
    use crate::error::ProviderError;
    use crate::provider::Provider;
    use crate::types::{ChatRequest, ChatResponse};
    use async_trait::async_trait;

    struct StubProvider;

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        async fn chat(
            &self,
            _req: &ChatRequest,
            _cancel: &CancellationToken,
        ) -> std::result::Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "done".into(),
                ..Default::default()
            })
        }
        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }
    }

    #[test]
    fn do_until_without_max_iter_fails_at_compile() {
        let inner = Step::agent(
            "inner",
            Arc::new(LlmAgent::new(AgentCore::new("a", "s"), Arc::new(StubProvider))),
            Arc::new(|_| AgentTask::new("x")),
        );
        let workflow = Workflow::new().add_step(
            Step::do_until("loop", inner).until(Arc::new(|_| true)),
        );
        let err = workflow.compile().unwrap_err();
        assert!(matches!(err, WorkflowError::MissingMaxIter(name) if name == "loop"));
    }

    #[tokio::test]
    async fn do_while_aborts_with_typed_error_once_max_iter_is_exceeded() {
        let inner = Step::agent(
            "inner",
            Arc::new(LlmAgent::new(AgentCore::new("a", "s"), Arc::new(StubProvider))),
            Arc::new(|_| AgentTask::new("x")),
        );
        let workflow = Workflow::new()
            .add_step(
                Step::do_while("loop", inner)
                    .while_true(Arc::new(|_| true))
                    .max_iter(3),
            )
            .compile()
            .unwrap();
        let err = workflow.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::AgentError::Workflow(WorkflowError::MaxIterExceeded(name, 3)) if name == "inner"
        ));
    }

    #[tokio::test]
    async fn for_each_exposes_per_iteration_index_and_collects_in_order() {
        let agent = Arc::new(LlmAgent::new(AgentCore::new("a", "s"), Arc::new(StubProvider)));
        let inner = Step::agent(
            "inner",
            agent,
            Arc::new(|ctx: &WorkflowContext| {
                let idx = ctx.current_index.unwrap_or(usize::MAX);
                AgentTask::new(format!("index {idx}"))
            }),
        );
        let step = Step::for_each("loop", inner).iter_over("items").concurrency(2);

        let mut ctx = WorkflowContext::default();
        ctx.outputs.insert(
            "items".to_string(),
            Value::Array(vec![Value::from("a"), Value::from("b"), Value::from("c")]),
        );

        let output = run_step(&step, &ctx, &CancellationToken::new()).await.unwrap();
        let items = output.as_array().expect("ForEach yields an array");
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn for_each_without_iter_over_fails_at_compile() {
        let inner = Step::agent(
            "inner",
            Arc::new(LlmAgent::new(AgentCore::new("a", "s"), Arc::new(StubProvider))),
            Arc::new(|_| AgentTask::new("x")),
        );
        let workflow = Workflow::new().add_step(Step::for_each("loop", inner));
        let err = workflow.compile().unwrap_err();
        assert!(matches!(err, WorkflowError::MissingIterOver(name) if name == "loop"));
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let a = LlmAgent::new(AgentCore::new("a", "s"), Arc::new(StubProvider));
        let agent = Arc::new(a);
        let workflow = Workflow::new()
            .add_step(Step::agent("x", agent.clone(), Arc::new(|_| AgentTask::new("1"))))
            .add_step(Step::agent("x", agent, Arc::new(|_| AgentTask::new("2"))));
        let err = workflow.compile().unwrap_err();
        assert_eq!(err, WorkflowError::DuplicateStep("x".to_string()));
    }

    #[test]
    fn dependency_on_unknown_step_is_rejected() {
        let agent = Arc::new(LlmAgent::new(AgentCore::new("a", "s"), Arc::new(StubProvider)));
        let workflow = Workflow::new().add_step(
            Step::agent("x", agent, Arc::new(|_| AgentTask::new("1"))).after(["ghost"]),
        );
        let err = workflow.compile().unwrap_err();
        assert_eq!(err, WorkflowError::UnresolvedInput("x".to_string()));
    }

    #[tokio::test]
    async fn runs_two_independent_agent_steps_and_collects_both_outputs() {
        let agent = Arc::new(LlmAgent::new(AgentCore::new("a", "s"), Arc::new(StubProvider)));
        let workflow = Workflow::new()
            .add_step(Step::agent("one", agent.clone(), Arc::new(|_| AgentTask::new("1"))))
            .add_step(Step::agent("two", agent, Arc::new(|_| AgentTask::new("2"))))
            .compile()
            .unwrap();
        let ctx = workflow.run(CancellationToken::new()).await.unwrap();
        assert!(ctx.get("one").is_some());
        assert!(ctx.get("two").is_some());
    }

    #[tokio::test]
    async fn second_step_runs_after_its_dependency_and_sees_its_output() {
        let agent = Arc::new(LlmAgent::new(AgentCore::new("a", "s"), Arc::new(StubProvider)));
        let workflow = Workflow::new()
            .add_step(Step::agent("first", agent.clone(), Arc::new(|_| AgentTask::new("1"))))
            .add_step(
                Step::agent(
                    "second",
                    agent,
                    Arc::new(|ctx: &WorkflowContext| {
                        let seen = ctx.get("first").is_some();
                        AgentTask::new(if seen { "saw-first" } else { "missing-first" })
                    }),
                )
                .after(["first"]),
            )
            .compile()
            .unwrap();
        let ctx = workflow.run(CancellationToken::new()).await.unwrap();
        assert!(ctx.get("second").is_some());
    }
}
