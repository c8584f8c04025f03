pub mod state_writer;
