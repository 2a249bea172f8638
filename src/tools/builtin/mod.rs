pub mod concentration;
pub mod cycle_detect;
pub mod dependency;
pub mod flows;
pub mod graph_query;
pub mod name_search;
pub mod path_trace;

pub use concentration::ConcentrationRiskTool;
pub use cycle_detect::DetectDistributionLoopsTool;
pub use dependency::SharedDependencyTool;
pub use graph_query::{GraphSchemaTool, ReadGraphQueryTool};
pub use name_search::NameSearchTool;
pub use path_trace::TraceSupplyPathsTool;
