pub mod dynamic_notification;
