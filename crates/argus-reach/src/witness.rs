//! Witnesses: concrete trajectories demonstrating reachability.
//!
//! A witness is an ordered sequence of time frames; each frame maps the
//! model's scalar state variables to the values a solver model assigned
//! them at the corresponding step. Witness identifiers carry a
//! process-wide monotonic counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use argus_expr::{Atom, ExprId, ExprPool, ScalarValue, Step};
use log::debug;

static WITNESS_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Next value of the process-wide witness counter
pub fn autoincrement() -> usize {
    WITNESS_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// One step of a witness: values per (context, identifier)
#[derive(Debug, Clone, Default)]
pub struct TimeFrame {
    map: HashMap<(ExprId, Atom), ScalarValue>,
    order: Vec<(ExprId, Atom)>,
}

impl TimeFrame {
    /// Create an empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value
    pub fn set_value(&mut self, ctx: ExprId, name: Atom, value: ScalarValue) {
        if self.map.insert((ctx, name), value).is_none() {
            self.order.push((ctx, name));
        }
    }

    /// Value of a variable in this frame
    pub fn value(&self, ctx: ExprId, name: Atom) -> Option<ScalarValue> {
        self.map.get(&(ctx, name)).copied()
    }

    /// True iff the variable has a value here
    pub fn has_value(&self, ctx: ExprId, name: Atom) -> bool {
        self.map.contains_key(&(ctx, name))
    }

    /// All recorded values in recording order
    pub fn values(&self) -> impl Iterator<Item = ((ExprId, Atom), ScalarValue)> + '_ {
        self.order.iter().map(move |k| (*k, self.map[k]))
    }
}

/// A reachability witness
#[derive(Debug, Clone)]
pub struct Witness {
    id: String,
    desc: String,
    frames: Vec<TimeFrame>,
}

impl Witness {
    /// Create an empty witness
    pub fn new(id: String, desc: String) -> Self {
        debug!("created witness `{id}`");
        Self {
            id,
            desc,
            frames: Vec::new(),
        }
    }

    /// Witness identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable description
    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// Append a frame; frames exist exactly for steps `0..len`
    pub fn push_frame(&mut self, frame: TimeFrame) {
        self.frames.push(frame);
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True iff the witness has no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame at a step
    pub fn frame(&self, step: Step) -> Option<&TimeFrame> {
        self.frames.get(step as usize)
    }

    /// All frames in step order
    pub fn frames(&self) -> &[TimeFrame] {
        &self.frames
    }

    /// Value of a variable at a step
    pub fn value(&self, ctx: ExprId, name: Atom, step: Step) -> Option<ScalarValue> {
        self.frame(step)?.value(ctx, name)
    }

    /// Render the witness: id, description, length, and per-frame
    /// variable/value pairs.
    pub fn render(&self, pool: &ExprPool) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "witness `{}`: {} ({} steps)\n",
            self.id,
            self.desc,
            self.frames.len()
        ));
        for (k, frame) in self.frames.iter().enumerate() {
            out.push_str(&format!("-- step {k}\n"));
            for ((ctx, name), value) in frame.values() {
                let prefix = {
                    let rendered = pool.render(ctx);
                    if rendered.is_empty() {
                        String::new()
                    } else {
                        format!("{rendered}.")
                    }
                };
                out.push_str(&format!(
                    "   {prefix}{} = {}\n",
                    pool.atom_name(name),
                    value.display(pool)
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_and_values() {
        let mut pool = ExprPool::new();
        let ctx = pool.empty();
        let x = pool.atom("x");

        let mut w = Witness::new("reach_0".to_string(), "test".to_string());
        assert!(w.is_empty());

        let mut f0 = TimeFrame::new();
        f0.set_value(ctx, x, ScalarValue::Bool(false));
        w.push_frame(f0);
        let mut f1 = TimeFrame::new();
        f1.set_value(ctx, x, ScalarValue::Bool(true));
        w.push_frame(f1);

        assert_eq!(w.len(), 2);
        assert_eq!(w.value(ctx, x, 0), Some(ScalarValue::Bool(false)));
        assert_eq!(w.value(ctx, x, 1), Some(ScalarValue::Bool(true)));
        assert_eq!(w.value(ctx, x, 2), None);
    }

    #[test]
    fn test_render() {
        let mut pool = ExprPool::new();
        let ctx = pool.empty();
        let x = pool.atom("x");

        let mut w = Witness::new("reach_1".to_string(), "toggle".to_string());
        let mut f = TimeFrame::new();
        f.set_value(ctx, x, ScalarValue::Int(3));
        w.push_frame(f);

        let text = w.render(&pool);
        assert!(text.contains("witness `reach_1`"));
        assert!(text.contains("-- step 0"));
        assert!(text.contains("x = 3"));
    }

    #[test]
    fn test_autoincrement_is_monotonic() {
        let a = autoincrement();
        let b = autoincrement();
        assert!(b > a);
    }
}
