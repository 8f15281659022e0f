mod defer_stream_on_root_field;
mod stream_on_list_field;

pub(super) use defer_stream_on_root_field::DeferStreamDirectiveOnRootField;
pub(super) use stream_on_list_field::StreamDirectiveOnListField;
