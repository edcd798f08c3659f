//! CNF projection of 0/1-valued decision diagrams ("no-cut" scheme).
//!
//! The projector walks every path of the diagram. A path ending in the
//! 0 terminal contributes one clause: the disjunction of the path's
//! decision literals, each negated if the path took the high branch and
//! asserted if it took the low branch, plus the group's negated
//! activation literal. Paths ending in 1 contribute nothing, so the
//! projected group is satisfiable exactly when the diagram can evaluate
//! to 1.
//!
//! Shared nodes are re-expanded per path prefix: pruning on revisit would
//! drop clauses for every prefix but the first and break soundness.

use argus_add::{Add, AddManager};
use argus_expr::Step;
use log::trace;

use crate::engine::{Engine, Group};

/// One step of the current path: the decision variable and whether the
/// high branch was taken
type PathStep = (u32, bool);

impl Engine {
    /// Project a 0/1 diagram at `time` into the engine, guarded by
    /// `group` when given.
    pub fn push_no_cut(&mut self, add: Add, time: Step, group: Option<Group>) {
        let mut path = Vec::new();
        let mut emitted = 0usize;
        self.walk_zero_paths(add, time, group, &mut path, &mut emitted);
        trace!(
            "engine `{}`: projected diagram with {emitted} clause(s) at time {time}",
            self.name()
        );
    }

    fn walk_zero_paths(
        &mut self,
        node: Add,
        time: Step,
        group: Option<Group>,
        path: &mut Vec<PathStep>,
        emitted: &mut usize,
    ) {
        let mgr: &AddManager = self.enc().add();
        if let Some(value) = mgr.terminal_value(node) {
            match value {
                1 => {}
                0 => {
                    let lits = self.path_clause(path, time);
                    self.add_clause(lits, group);
                    *emitted += 1;
                }
                other => panic!("projected diagram has non-boolean terminal {other}"),
            }
            return;
        }

        let var = mgr.var(node).expect("internal node");
        let high = mgr.high(node).expect("internal node");
        let low = mgr.low(node).expect("internal node");

        path.push((var, true));
        self.walk_zero_paths(high, time, group, path, emitted);
        path.pop();

        path.push((var, false));
        self.walk_zero_paths(low, time, group, path, emitted);
        path.pop();
    }

    /// Clause literals for one falsified path: high branch taken means
    /// the variable must not be true in a model, so it appears negated.
    fn path_clause(&mut self, path: &[PathStep], time: Step) -> Vec<i32> {
        path.iter()
            .map(|(var, high)| {
                let v = self.find_dd_var(*var, time);
                if *high {
                    -v
                } else {
                    v
                }
            })
            .collect()
    }

    /// A solver literal equivalent to a 0/1 diagram at `time`.
    ///
    /// Plain variable indicators bind directly to the variable's solver
    /// literal; compound diagrams get a fresh definition literal tied to
    /// the diagram by path clauses in both directions.
    pub fn literal_for(&mut self, add: Add, time: Step, group: Option<Group>) -> i32 {
        let mgr = self.enc().add();

        if let Some(v) = mgr.terminal_value(add) {
            let t = self.true_lit();
            return if v != 0 { t } else { -t };
        }

        // indicator forms ite(v, 1, 0) and ite(v, 0, 1)
        let var = mgr.var(add).expect("internal node");
        let high = mgr.high(add).expect("internal node");
        let low = mgr.low(add).expect("internal node");
        let hv = mgr.terminal_value(high);
        let lv = mgr.terminal_value(low);
        if hv == Some(1) && lv == Some(0) {
            return self.find_dd_var(var, time);
        }
        if hv == Some(0) && lv == Some(1) {
            return -self.find_dd_var(var, time);
        }

        let def = self.fresh_var();
        let mut path = Vec::new();
        self.walk_definition(add, time, group, def, &mut path);
        def
    }

    /// Tie `def` to the diagram: every 0-path forbids `def`, every 1-path
    /// forces it.
    fn walk_definition(
        &mut self,
        node: Add,
        time: Step,
        group: Option<Group>,
        def: i32,
        path: &mut Vec<PathStep>,
    ) {
        if let Some(value) = self.enc().add().terminal_value(node) {
            let mut lits = self.path_clause(path, time);
            match value {
                0 => lits.push(-def),
                1 => lits.push(def),
                other => panic!("defined diagram has non-boolean terminal {other}"),
            }
            self.add_clause(lits, group);
            return;
        }

        let mgr = self.enc().add();
        let var = mgr.var(node).expect("internal node");
        let high = mgr.high(node).expect("internal node");
        let low = mgr.low(node).expect("internal node");

        path.push((var, true));
        self.walk_definition(high, time, group, def, path);
        path.pop();

        path.push((var, false));
        self.walk_definition(low, time, group, def, path);
        path.pop();
    }
}
