pub mod tensor_engine;
pub mod tensor_info;
