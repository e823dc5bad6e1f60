pub mod marshal;
pub mod procedure;
pub mod row;

pub use marshal::marshal_rows;
pub use procedure::ProcedureResult;
pub use row::RowRecord;
