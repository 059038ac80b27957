//! Hand-annotated prost mappings for the handful of demo / netmessage protos
//! the state stream consumes. Field numbers follow valve's `demo.proto` and
//! `netmessages.proto`; only the members this crate reads are mapped, unknown
//! fields are skipped by prost during decode.

#[derive(Clone, PartialEq, prost::Message)]
pub struct CsvcMsgServerInfo {
    #[prost(int32, optional, tag = "1")]
    pub protocol: Option<i32>,
    #[prost(int32, optional, tag = "10")]
    pub max_clients: Option<i32>,
    #[prost(int32, optional, tag = "11")]
    pub max_classes: Option<i32>,
    #[prost(float, optional, tag = "13")]
    pub tick_interval: Option<f32>,
    #[prost(string, optional, tag = "14")]
    pub game_dir: Option<String>,
    #[prost(string, optional, tag = "15")]
    pub map_name: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CDemoSendTables {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub data: Option<Vec<u8>>,
}

pub mod c_demo_class_info {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ClassT {
        #[prost(int32, optional, tag = "1")]
        pub class_id: Option<i32>,
        #[prost(string, optional, tag = "2")]
        pub network_name: Option<String>,
        #[prost(string, optional, tag = "3")]
        pub table_name: Option<String>,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CDemoClassInfo {
    #[prost(message, repeated, tag = "1")]
    pub classes: Vec<c_demo_class_info::ClassT>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CsvcMsgCreateStringTable {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(int32, optional, tag = "2")]
    pub num_entries: Option<i32>,
    #[prost(bool, optional, tag = "3")]
    pub user_data_fixed_size: Option<bool>,
    #[prost(int32, optional, tag = "4")]
    pub user_data_size: Option<i32>,
    #[prost(int32, optional, tag = "5")]
    pub user_data_size_bits: Option<i32>,
    #[prost(int32, optional, tag = "6")]
    pub flags: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub string_data: Option<Vec<u8>>,
    #[prost(int32, optional, tag = "8")]
    pub uncompressed_size: Option<i32>,
    #[prost(bool, optional, tag = "9")]
    pub data_compressed: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CsvcMsgUpdateStringTable {
    #[prost(int32, optional, tag = "1")]
    pub table_id: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub num_changed_entries: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub string_data: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtoFlattenedSerializerFieldT {
    #[prost(int32, optional, tag = "1")]
    pub var_type_sym: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub var_name_sym: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub bit_count: Option<i32>,
    #[prost(float, optional, tag = "4")]
    pub low_value: Option<f32>,
    #[prost(float, optional, tag = "5")]
    pub high_value: Option<f32>,
    #[prost(int32, optional, tag = "6")]
    pub encode_flags: Option<i32>,
    #[prost(int32, optional, tag = "7")]
    pub field_serializer_name_sym: Option<i32>,
    #[prost(int32, optional, tag = "8")]
    pub field_serializer_version: Option<i32>,
    #[prost(int32, optional, tag = "9")]
    pub send_node_sym: Option<i32>,
    #[prost(int32, optional, tag = "10")]
    pub var_encoder_sym: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtoFlattenedSerializerT {
    #[prost(int32, optional, tag = "1")]
    pub serializer_name_sym: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub serializer_version: Option<i32>,
    #[prost(int32, repeated, packed = "false", tag = "3")]
    pub fields_index: Vec<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CsvcMsgFlattenedSerializer {
    #[prost(message, repeated, tag = "1")]
    pub serializers: Vec<ProtoFlattenedSerializerT>,
    #[prost(string, repeated, tag = "2")]
    pub symbols: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub fields: Vec<ProtoFlattenedSerializerFieldT>,
}
