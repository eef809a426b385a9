mod appointments;
mod improvements;
mod routines;
mod sharing;
mod tasks;
