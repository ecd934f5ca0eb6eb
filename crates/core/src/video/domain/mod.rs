pub mod frame_reader;
