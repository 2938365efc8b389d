// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dispatching results to the QA handlers that know about them.

use std::any::type_name;
use std::fmt;

use log::{debug, trace};

use crate::{
    context::Context,
    tasks::{ResultsList, TaskResults},
};

type Predicate = Box<dyn Fn(&dyn TaskResults) -> bool>;
type Handle = Box<dyn Fn(&Context, &mut dyn TaskResults)>;

/// A QA handler: a predicate saying which results it understands, and the
/// function that scores them.
pub struct QaHandler {
    name: String,
    description: String,
    predicate: Predicate,
    handle: Handle,
}

fn is_type<T: TaskResults>(result: &dyn TaskResults) -> bool {
    result.as_any().is::<T>()
}

impl QaHandler {
    /// A handler for results of type `R`.
    pub fn for_results<R, F>(name: &str, handle: F) -> QaHandler
    where
        R: TaskResults,
        F: Fn(&Context, &mut R) + 'static,
    {
        QaHandler {
            name: name.to_string(),
            description: format!("handles {}", short_type_name::<R>()),
            predicate: Box::new(is_type::<R>),
            handle: Box::new(move |context: &Context, result: &mut dyn TaskResults| {
                if let Some(result) = result.as_any_mut().downcast_mut::<R>() {
                    handle(context, result)
                }
            }),
        }
    }

    /// A handler for lists whose elements are all of type `C`. An empty list
    /// qualifies.
    pub fn for_list_of<C, F>(name: &str, handle: F) -> QaHandler
    where
        C: TaskResults,
        F: Fn(&Context, &mut ResultsList) + 'static,
    {
        QaHandler {
            name: name.to_string(),
            description: format!("handles lists of {}", short_type_name::<C>()),
            predicate: Box::new(|result: &dyn TaskResults| {
                result
                    .as_any()
                    .downcast_ref::<ResultsList>()
                    .map_or(false, |list| {
                        list.iter().all(|child| is_type::<C>(child))
                    })
            }),
            handle: Box::new(move |context: &Context, result: &mut dyn TaskResults| {
                if let Some(list) = result.as_any_mut().downcast_mut::<ResultsList>() {
                    handle(context, list)
                }
            }),
        }
    }

    /// Only handle results (or, for lists, elements) produced by the named
    /// task.
    pub fn generated_by(mut self, task: &'static str) -> QaHandler {
        let inner = self.predicate;
        self.predicate = Box::new(move |result: &dyn TaskResults| {
            if !inner(result) {
                return false;
            }
            match result.as_any().downcast_ref::<ResultsList>() {
                Some(list) => list.iter().all(|child| child.task_name() == task),
                None => result.task_name() == task,
            }
        });
        self.description = format!("{} generated by {task}", self.description);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_handler_for(&self, result: &dyn TaskResults) -> bool {
        (self.predicate)(result)
    }

    pub fn handle(&self, context: &Context, result: &mut dyn TaskResults) {
        (self.handle)(context, result)
    }
}

impl fmt::Debug for QaHandler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("QaHandler")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// An ordered collection of QA handlers.
#[derive(Debug, Default)]
pub struct QaRegistry {
    handlers: Vec<QaHandler>,
}

impl QaRegistry {
    pub fn new() -> QaRegistry {
        QaRegistry::default()
    }

    pub fn add_handler(&mut self, handler: QaHandler) {
        debug!("Registering QA handler {} ({})", handler.name, handler.description);
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Score `result` with every matching handler, in registration order.
    /// The elements of lists are scored first, so a handler for the list can
    /// use its children's scores.
    pub fn do_qa(&self, context: &Context, result: &mut dyn TaskResults) {
        if let Some(children) = result.children_mut() {
            for child in children.iter_mut() {
                self.do_qa(context, child.as_mut());
            }
        }

        for handler in &self.handlers {
            if handler.is_handler_for(result) {
                trace!(
                    "QA handler {} is scoring results of {}",
                    handler.name,
                    result.task_name()
                );
                handler.handle(context, result);
            }
        }
    }

    /// All of the handlers of `self`, followed by those of `other`.
    pub fn merge(mut self, other: QaRegistry) -> QaRegistry {
        self.handlers.extend(other.handlers);
        self
    }
}
