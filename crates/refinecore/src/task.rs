use serde::{Deserialize, Serialize};

/// Closed set of step kinds a workflow node can execute.
///
/// The descriptor table below is the task registry: it is total over this
/// enum, so an unknown task type is unrepresentable and adding a variant
/// will not compile until its declarations exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    SetContext,
    OptimizeCode,
    AddUnitTests,
    AddE2eTests,
    AddInlineDocs,
    AddReadmeDocs,
    RequestApproval,
    SaveResults,
}

/// Kind of value a port carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortKind {
    Text,
    Flag,
    Json,
}

/// Declared input port of a task type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputDecl {
    pub name: &'static str,
    pub required: bool,
    pub kind: PortKind,
}

/// Declared output port of a task type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputDecl {
    pub name: &'static str,
    pub kind: PortKind,
}

/// Static registry entry for one task type
#[derive(Debug, Clone, Copy)]
pub struct TaskDescriptor {
    pub inputs: &'static [InputDecl],
    pub outputs: &'static [OutputDecl],
    pub credits: u32,
    pub entry_point: bool,
}

const fn input(name: &'static str, required: bool, kind: PortKind) -> InputDecl {
    InputDecl { name, required, kind }
}

const fn output(name: &'static str, kind: PortKind) -> OutputDecl {
    OutputDecl { name, kind }
}

impl TaskType {
    /// Registry lookup. Pure and total over all task types.
    pub const fn descriptor(&self) -> TaskDescriptor {
        match self {
            TaskType::SetContext => TaskDescriptor {
                // const blocks promote the slices to 'static
                inputs: const {
                    &[
                        input("Code", true, PortKind::Text),
                        input("Context", false, PortKind::Text),
                    ]
                },
                outputs: const { &[output("Code", PortKind::Text)] },
                credits: 1,
                entry_point: true,
            },
            TaskType::OptimizeCode => TaskDescriptor {
                inputs: const {
                    &[
                        input("Code", true, PortKind::Text),
                        input("Instructions", false, PortKind::Text),
                    ]
                },
                outputs: const { &[output("Code", PortKind::Text)] },
                credits: 4,
                entry_point: false,
            },
            TaskType::AddUnitTests => TaskDescriptor {
                inputs: const { &[input("Code", true, PortKind::Text)] },
                outputs: const { &[output("Tests", PortKind::Text)] },
                credits: 3,
                entry_point: false,
            },
            TaskType::AddE2eTests => TaskDescriptor {
                inputs: const { &[input("Code", true, PortKind::Text)] },
                outputs: const { &[output("Tests", PortKind::Text)] },
                credits: 3,
                entry_point: false,
            },
            TaskType::AddInlineDocs => TaskDescriptor {
                inputs: const { &[input("Code", true, PortKind::Text)] },
                outputs: const { &[output("Docs", PortKind::Text)] },
                credits: 2,
                entry_point: false,
            },
            TaskType::AddReadmeDocs => TaskDescriptor {
                inputs: const { &[input("Code", true, PortKind::Text)] },
                outputs: const { &[output("Docs", PortKind::Text)] },
                credits: 2,
                entry_point: false,
            },
            TaskType::RequestApproval => TaskDescriptor {
                inputs: const { &[input("Code", false, PortKind::Text)] },
                outputs: const {
                    &[
                        output("Approved", PortKind::Flag),
                        output("Code", PortKind::Text),
                    ]
                },
                credits: 1,
                entry_point: false,
            },
            TaskType::SaveResults => TaskDescriptor {
                // sink port: orders persistence after its producers
                inputs: const { &[input("Results", false, PortKind::Text)] },
                outputs: &[],
                credits: 1,
                entry_point: false,
            },
        }
    }

    /// All task types, in registry order
    pub const ALL: [TaskType; 8] = [
        TaskType::SetContext,
        TaskType::OptimizeCode,
        TaskType::AddUnitTests,
        TaskType::AddE2eTests,
        TaskType::AddInlineDocs,
        TaskType::AddReadmeDocs,
        TaskType::RequestApproval,
        TaskType::SaveResults,
    ];

    /// Stable tag used in workflow files and logs (e.g. "code.optimize")
    pub fn tag(&self) -> &'static str {
        match self {
            TaskType::SetContext => "context.set",
            TaskType::OptimizeCode => "code.optimize",
            TaskType::AddUnitTests => "tests.unit",
            TaskType::AddE2eTests => "tests.e2e",
            TaskType::AddInlineDocs => "docs.inline",
            TaskType::AddReadmeDocs => "docs.readme",
            TaskType::RequestApproval => "approval.request",
            TaskType::SaveResults => "results.save",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_descriptor_declares_priced_named_ports() {
        for task_type in TaskType::ALL {
            let d = task_type.descriptor();
            assert!(d.credits > 0, "{task_type} must cost at least one credit");
            for decl in d.inputs {
                assert!(!decl.name.is_empty());
            }
            for decl in d.outputs {
                assert!(!decl.name.is_empty());
            }
        }
    }

    #[test]
    fn set_context_is_the_only_entry_point() {
        let entries: Vec<TaskType> = TaskType::ALL
            .into_iter()
            .filter(|t| t.descriptor().entry_point)
            .collect();
        assert_eq!(entries, vec![TaskType::SetContext]);
    }

    #[test]
    fn descriptors_outlive_the_lookup() {
        let inputs: &'static [InputDecl] = TaskType::OptimizeCode.descriptor().inputs;
        assert_eq!(inputs[0].name, "Code");
        assert!(inputs[0].required);
    }
}
