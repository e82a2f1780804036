pub mod time_entry_dto;
