//! CSV journal replay used by the command-line binary: tutor catalog and
//! command journal in, reports out.

pub mod command_reader;
pub mod replay;
pub mod report_writer;
pub mod tutor_reader;
