//! Shared data model of the mq-bridge workspace: configuration, topic
//! descriptions, platform wire types, device-type metadata and the
//! capability traits the core consumes.

pub mod constants;
pub mod metadata;
pub mod platform;
pub mod ports;
pub mod settings;
pub mod topic;

pub use metadata::{Content, ContentVariable, DeviceType, Serialization, Service};
pub use platform::{Command, DeviceInfo, DeviceInfoUpdate, DeviceState, UpdateMethod};
pub use ports::{
    CommandHandler, DescriptionProvider, MessageHandler, MetadataRepo, MqttPort, PlatformPort,
    RefreshHandler,
};
pub use settings::Settings;
pub use topic::{command_key, TopicDescription, Transformation, TransformationKind};
